//! Scripted transport used by the unit tests of this crate.

use async_trait::async_trait;
use bson::{Document, doc};
use std::{collections::VecDeque, sync::Mutex};

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    session::ErrorDescriptor,
    transport::{Namespace, QueryRequest, Transport, WriteOp},
};

#[derive(Debug, Default)]
pub(crate) struct RecordingTransport {
    writes: Mutex<Vec<(Namespace, WriteOp)>>,
    commands: Mutex<Vec<(String, Document)>>,
    queries: Mutex<Vec<(Namespace, QueryRequest)>>,
    outcomes: Mutex<VecDeque<Vec<ErrorDescriptor>>>,
    responses: Mutex<VecDeque<DocumentStoreResult<Document>>>,
    batches: Mutex<VecDeque<Vec<Document>>>,
    write_fault: Mutex<Option<String>>,
}

impl RecordingTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Outcomes returned by the next write instead of the default successes.
    pub(crate) fn push_outcomes(&self, outcomes: Vec<ErrorDescriptor>) {
        self.outcomes.lock().unwrap().push_back(outcomes);
    }

    pub(crate) fn push_response(&self, response: DocumentStoreResult<Document>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub(crate) fn push_batch(&self, batch: Vec<Document>) {
        self.batches.lock().unwrap().push_back(batch);
    }

    pub(crate) fn fail_next_write(&self, message: &str) {
        *self.write_fault.lock().unwrap() = Some(message.to_string());
    }

    pub(crate) fn writes(&self) -> Vec<(Namespace, WriteOp)> {
        self.writes.lock().unwrap().clone()
    }

    pub(crate) fn commands(&self) -> Vec<(String, Document)> {
        self.commands.lock().unwrap().clone()
    }

    pub(crate) fn queries(&self) -> Vec<(Namespace, QueryRequest)> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_write(
        &self,
        namespace: &Namespace,
        op: WriteOp,
    ) -> DocumentStoreResult<Vec<ErrorDescriptor>> {
        if let Some(message) = self.write_fault.lock().unwrap().take() {
            return Err(DocumentStoreError::Transport(message));
        }

        let default = match &op {
            WriteOp::Insert { documents } => documents
                .iter()
                .map(|_| ErrorDescriptor::success(1))
                .collect(),
            _ => vec![ErrorDescriptor::success(1)],
        };
        self.writes.lock().unwrap().push((namespace.clone(), op));

        Ok(self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(default))
    }

    async fn send_command(&self, database: &str, command: Document) -> DocumentStoreResult<Document> {
        self.commands
            .lock()
            .unwrap()
            .push((database.to_string(), command));

        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(doc! { "ok": 1.0 }))
    }

    async fn query(&self, namespace: &Namespace, request: QueryRequest) -> DocumentStoreResult<Vec<Document>> {
        self.queries
            .lock()
            .unwrap()
            .push((namespace.clone(), request));

        Ok(self
            .batches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }
}
