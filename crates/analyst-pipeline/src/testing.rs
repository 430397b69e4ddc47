//! Scripted generators for unit tests

use analyst_llm::{LLMError, TextGenerator};
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Replies with canned text, optionally routed on a system-prompt marker
pub(crate) struct ScriptedGenerator {
    default_reply: String,
    routes: Vec<(String, String)>,
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub(crate) fn new(default_reply: &str) -> Self {
        Self {
            default_reply: default_reply.to_string(),
            routes: Vec::new(),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Answer `reply` when the system prompt contains `marker`
    pub(crate) fn on(mut self, marker: &str, reply: &str) -> Self {
        self.routes.push((marker.to_string(), reply.to_string()));
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// User prompts received so far
    pub(crate) fn user_prompts(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, system: &str, user: &str) -> analyst_llm::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(user.to_string());
        let reply = self
            .routes
            .iter()
            .find(|(marker, _)| system.contains(marker.as_str()))
            .map_or(&self.default_reply, |(_, reply)| reply);
        Ok(reply.clone())
    }
}

/// Always fails with a transport error
pub(crate) struct FailingGenerator;

#[async_trait]
impl TextGenerator for FailingGenerator {
    async fn generate(&self, _system: &str, _user: &str) -> analyst_llm::Result<String> {
        Err(LLMError::RequestFailed("upstream unreachable".to_string()))
    }
}
