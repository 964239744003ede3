//! Scripted SRV lookup.
//!
//! Answers are consumed in order; once the script is exhausted the fallback
//! is returned (an error unless configured otherwise).

use crate::domain::{DiscoveryError, SrvRecord};
use crate::ports::SrvLookup;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

type Answer = Result<Vec<SrvRecord>, String>;

/// An `SrvLookup` that replays queued answers.
#[derive(Debug)]
pub struct ScriptedSrvLookup {
    script: Mutex<VecDeque<Answer>>,
    fallback: Mutex<Answer>,
    queried: Mutex<Vec<String>>,
}

impl Default for ScriptedSrvLookup {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedSrvLookup {
    /// Empty script; every query fails until answers are pushed.
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Err("no scripted answer".to_string())),
            queried: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful answer.
    pub fn push_records(&self, records: Vec<SrvRecord>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Ok(records));
        }
    }

    /// Queue a failed answer.
    pub fn push_error(&self, reason: &str) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Err(reason.to_string()));
        }
    }

    /// Answer returned after the script runs out.
    pub fn set_fallback_records(&self, records: Vec<SrvRecord>) {
        if let Ok(mut fallback) = self.fallback.lock() {
            *fallback = Ok(records);
        }
    }

    /// Error returned after the script runs out.
    pub fn set_fallback_error(&self, reason: &str) {
        if let Ok(mut fallback) = self.fallback.lock() {
            *fallback = Err(reason.to_string());
        }
    }

    /// Number of queries served.
    pub fn calls(&self) -> usize {
        self.queried.lock().map(|q| q.len()).unwrap_or_default()
    }

    /// Names queried, in order.
    pub fn queried(&self) -> Vec<String> {
        self.queried.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SrvLookup for ScriptedSrvLookup {
    async fn lookup_srv(&self, service_name: &str) -> Result<Vec<SrvRecord>, DiscoveryError> {
        if let Ok(mut queried) = self.queried.lock() {
            queried.push(service_name.to_string());
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        let answer = match next {
            Some(answer) => answer,
            None => self
                .fallback
                .lock()
                .map(|f| f.clone())
                .unwrap_or_else(|_| Err("poisoned".to_string())),
        };
        answer.map_err(|reason| DiscoveryError::lookup(service_name, reason))
    }
}
