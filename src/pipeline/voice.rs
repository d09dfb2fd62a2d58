use super::{MediaPipeline, PipelineError, UploadedFile, VoiceReply};
use crate::llm::{LlmError, Prompting, SelectionStrategy};
use crate::session::VoiceExchange;

impl MediaPipeline {
    /// Transcribe, answer, and append the exchange to an existing session.
    ///
    /// The session is only written after the provider has replied, so a failed call leaves
    /// the stored history untouched.
    pub(super) async fn run_voice(
        &self,
        session_id: &str,
        file: UploadedFile,
        selector: &str,
    ) -> Result<VoiceReply, PipelineError> {
        let transcript = self.transcription.transcribe(&file).await?;
        if transcript.trim().is_empty() {
            tracing::info!(session_id, file = %file.stored_name, "No speech detected");
            return Err(PipelineError::EmptyTranscript);
        }

        if self.sessions.find(session_id).await?.is_none() {
            return Err(PipelineError::SessionNotFound(session_id.to_string()));
        }

        let reply = match self
            .llm
            .ask(&transcript, selector, SelectionStrategy::Exact, Prompting::Conversation)
            .await
        {
            Ok(Some(reply)) => {
                self.metrics.record_provider_call(true);
                reply
            }
            Ok(None) => return Err(PipelineError::UnknownProvider(selector.to_string())),
            Err(LlmError::UnknownProvider(selector)) => {
                return Err(PipelineError::UnknownProvider(selector));
            }
            Err(error) => {
                self.metrics.record_provider_call(false);
                return Err(error.into());
            }
        };

        let exchange = VoiceExchange::new(transcript.clone(), reply.clone());
        let session = self
            .sessions
            .append_exchange(session_id, exchange)
            .await?
            .ok_or_else(|| PipelineError::SessionNotFound(session_id.to_string()))?;
        self.metrics.record_voice_exchange();
        tracing::info!(
            session_id,
            turns = session.chat_history.len(),
            model = selector,
            "Voice exchange saved"
        );

        Ok(VoiceReply {
            transcription: transcript,
            reply,
            model_used: selector.to_string(),
        })
    }
}
