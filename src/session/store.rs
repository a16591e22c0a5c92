//! In-process session storage
//!
//! Locks are only held while reading or writing a session, never across a
//! completion call, so one slow run does not block other clients.

use std::collections::HashMap;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::PromptSet;
use crate::conversation::Message;
use crate::core::{BenchEngine, ComparisonEntry, VariantOutcome};
use crate::providers::CompletionRequest;

use super::{NewSession, Session, SessionError};

/// Reply of one chat call
#[derive(Debug, Clone, PartialEq)]
pub struct ChatOutcome {
    pub reply: String,
    /// False when the session was reset or removed while the call ran, in
    /// which case the reply was not appended
    pub recorded: bool,
}

pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, Session>>,
    seed: Option<PromptSet>,
}

impl SessionStore {
    pub fn new(seed: Option<PromptSet>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            seed,
        }
    }

    pub async fn create(&self, init: NewSession) -> Result<Session, SessionError> {
        let mut session = Session::new(self.seed.as_ref());
        session.apply(init)?;

        self.sessions
            .write()
            .await
            .insert(session.id, session.clone());

        tracing::debug!(session = %session.id, "session created");
        Ok(session)
    }

    pub async fn get(&self, id: Uuid) -> Result<Session, SessionError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(SessionError::NotFound(id))
    }

    pub async fn remove(&self, id: Uuid) -> Result<(), SessionError> {
        self.sessions
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(SessionError::NotFound(id))
    }

    /// Run `f` against the stored session under the write lock
    pub async fn update<R>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Session) -> Result<R, SessionError>,
    ) -> Result<R, SessionError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id).ok_or(SessionError::NotFound(id))?;
        f(session)
    }

    /// Simulate the session's selection and store the outcomes
    pub async fn simulate(
        &self,
        engine: &BenchEngine,
        id: Uuid,
    ) -> Result<Vec<VariantOutcome>, SessionError> {
        let request = self.get(id).await?.simulation_request();
        let outcomes = engine.simulate(&request).await?;

        self.update(id, |session| {
            session.last_simulation = outcomes.clone();
            Ok(())
        })
        .await?;

        Ok(outcomes)
    }

    /// Compare variants on one user message and append the entries to the
    /// session's results
    pub async fn compare(
        &self,
        engine: &BenchEngine,
        id: Uuid,
        user_message: String,
        iterations: u32,
    ) -> Result<Vec<ComparisonEntry>, SessionError> {
        let request = self
            .get(id)
            .await?
            .comparison_request(user_message, iterations);
        let entries = engine.compare(&request).await?;

        self.update(id, |session| {
            session.record_comparison(&entries, iterations);
            Ok(())
        })
        .await?;

        Ok(entries)
    }

    /// Append a user message, ask the chat prompt for a reply and append it.
    ///
    /// On failure the user message stays in the transcript. The reply is only
    /// appended if the transcript still ends with this call's user message.
    pub async fn chat(
        &self,
        engine: &BenchEngine,
        id: Uuid,
        message: String,
    ) -> Result<ChatOutcome, SessionError> {
        if message.trim().is_empty() {
            return Err(SessionError::Invalid("message must not be empty".into()));
        }

        let (request, pending_len) = self
            .update(id, |session| {
                session.transcript.add_user(&message);
                let request = CompletionRequest::new(
                    session.chat_prompt(),
                    session.transcript.messages(),
                    &session.generation,
                );
                Ok((request, session.transcript.len()))
            })
            .await?;

        let reply = engine.call(&request).await?;

        let pending = Message::user(message.as_str());
        let recorded = self
            .update(id, |session| {
                let unchanged = session.transcript.len() == pending_len
                    && session.transcript.messages().last() == Some(&pending);
                if unchanged {
                    session.transcript.add_assistant(&reply);
                }
                Ok(unchanged)
            })
            .await
            .unwrap_or(false);

        if !recorded {
            tracing::warn!(session = %id, "session changed during chat call, reply not recorded");
        }

        Ok(ChatOutcome { reply, recorded })
    }
}
