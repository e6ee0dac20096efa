#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::Semaphore;
use view_batcher::{BatchAck, BatchEndpoint, ItemId, SubmitError};

pub fn id(raw: &str) -> ItemId {
    ItemId::parse(raw).expect("valid test id")
}

pub fn ids(raw: &[&str]) -> Vec<ItemId> {
    raw.iter().map(|r| id(r)).collect()
}

pub fn counts(pairs: &[(&str, u64)]) -> HashMap<ItemId, u64> {
    pairs.iter().map(|(r, c)| (id(r), *c)).collect()
}

/// In-process endpoint: replays scripted replies in order, then confirms every
/// item with a count of 1. Optionally holds each submission until released.
pub struct ScriptedEndpoint {
    script: Mutex<VecDeque<Result<BatchAck, SubmitError>>>,
    submissions: Mutex<Vec<Vec<ItemId>>>,
    gate: Option<Semaphore>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedEndpoint {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            submissions: Mutex::new(Vec::new()),
            gate: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Every submission blocks until `release` hands out a permit.
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new()
        }
    }

    pub fn push_reply(&self, reply: Result<BatchAck, SubmitError>) {
        self.script.lock().unwrap().push_back(reply);
    }

    pub fn release(&self, submissions: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(submissions);
        }
    }

    pub fn submissions(&self) -> Vec<Vec<ItemId>> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BatchEndpoint for ScriptedEndpoint {
    async fn submit(&self, items: Vec<ItemId>) -> Result<BatchAck, SubmitError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.submissions.lock().unwrap().push(items.clone());

        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        let reply = self.script.lock().unwrap().pop_front();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        reply.unwrap_or_else(|| Ok(BatchAck::with_counts(items.into_iter().map(|i| (i, 1)).collect())))
    }
}
