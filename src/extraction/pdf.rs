use super::ExtractionError;

/// Parse the whole PDF into text on the blocking pool.
///
/// `pdf-extract` can panic on malformed cross-reference tables; a panic surfaces as a join
/// error and is reported like any other parse failure.
pub(super) async fn extract_text(bytes: Vec<u8>) -> Result<String, ExtractionError> {
    tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|error| ExtractionError::Pdf(format!("parser aborted: {error}")))?
        .map_err(|error| ExtractionError::Pdf(error.to_string()))
}
