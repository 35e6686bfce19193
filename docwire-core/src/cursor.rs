//! Lazy, batched query cursors.
//!
//! A [`Cursor`] does nothing until the first call to [`Cursor::next`]; it then pulls
//! results from the transport one batch at a time. A batch shorter than requested
//! ends the cursor.

use bson::Document;
use futures::{Stream, stream};
use std::{collections::VecDeque, marker::PhantomData};
use tracing::trace;

use crate::{
    document::{DocumentExt, Record},
    error::DocumentStoreResult,
    session::Connection,
    transport::{Namespace, QueryRequest, Transport},
};

/// A lazy sequence of query results.
///
/// ```ignore
/// let mut cursor = orders.find(doc! { "status": "open" }).sort(doc! { "placed": -1 }).limit(50);
/// while let Some(order) = cursor.next().await? {
///     // ...
/// }
/// ```
#[derive(Debug)]
pub struct Cursor<'a, B: Transport, T> {
    connection: &'a Connection<B>,
    namespace: Namespace,
    selector: Document,
    sort: Option<Document>,
    skip: u64,
    limit: Option<u64>,
    batch_size: u32,
    buffer: VecDeque<Document>,
    fetched: u64,
    exhausted: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, B: Transport, T: Record> Cursor<'a, B, T> {
    pub(crate) fn new(connection: &'a Connection<B>, namespace: Namespace, selector: Document) -> Self {
        Self {
            connection,
            namespace,
            selector,
            sort: None,
            skip: 0,
            limit: None,
            batch_size: connection.options().batch_size,
            buffer: VecDeque::new(),
            fetched: 0,
            exhausted: false,
            _marker: PhantomData,
        }
    }

    /// Replaces the filter results must match.
    pub fn selector(mut self, selector: Document) -> Self {
        self.selector = selector;
        self
    }

    pub fn sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    /// Caps the total number of results. Zero yields nothing.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Overrides the connection's batch size for this cursor.
    pub fn batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Returns the next result, fetching a new batch when the buffer is empty.
    pub async fn next(&mut self) -> DocumentStoreResult<Option<T>> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fetch_batch().await?;
        }

        match self.buffer.pop_front() {
            Some(document) => Ok(Some(T::from_document(document)?)),
            None => Ok(None),
        }
    }

    /// Drains the cursor into a vector.
    pub async fn try_collect_all(mut self) -> DocumentStoreResult<Vec<T>> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await? {
            items.push(item);
        }

        Ok(items)
    }

    /// Turns the cursor into a stream of results.
    pub fn into_stream(self) -> impl Stream<Item = DocumentStoreResult<T>> + 'a
    where
        T: 'a,
    {
        stream::try_unfold(self, |mut cursor| async move {
            Ok(cursor
                .next()
                .await?
                .map(|item| (item, cursor)))
        })
    }

    async fn fetch_batch(&mut self) -> DocumentStoreResult<()> {
        let wanted = match self.limit {
            Some(limit) => u64::from(self.batch_size).min(limit.saturating_sub(self.fetched)),
            None => u64::from(self.batch_size),
        };
        if wanted == 0 {
            self.exhausted = true;
            return Ok(());
        }

        let request = QueryRequest {
            selector: self.selector.clone(),
            sort: self.sort.clone(),
            skip: self.skip + self.fetched,
            limit: Some(wanted),
            batch_size: Some(self.batch_size),
        };
        let batch = self
            .connection
            .query(&self.namespace, request)
            .await?;

        trace!(namespace = %self.namespace, offset = self.fetched, size = batch.len(), "fetched batch");

        let received = batch.len() as u64;
        self.fetched += received;
        if received < wanted {
            self.exhausted = true;
        }
        self.buffer.extend(batch);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::DocumentStoreError, testing::RecordingTransport};
    use bson::doc;
    use futures::TryStreamExt;

    fn numbered(range: std::ops::Range<i32>) -> Vec<Document> {
        range.map(|n| doc! { "_id": n }).collect()
    }

    fn cursor(connection: &Connection<RecordingTransport>) -> Cursor<'_, RecordingTransport, Document> {
        Cursor::new(connection, Namespace::new("app", "items"), doc! { "kind": "a" })
    }

    #[tokio::test]
    async fn nothing_is_fetched_before_iteration() {
        let connection = Connection::new(RecordingTransport::new());
        let _cursor = cursor(&connection).sort(doc! { "_id": 1 });

        assert!(connection.transport().queries().is_empty());
    }

    #[tokio::test]
    async fn results_are_pulled_batch_by_batch() {
        let transport = RecordingTransport::new();
        transport.push_batch(numbered(0..2));
        transport.push_batch(numbered(2..4));
        transport.push_batch(numbered(4..5));
        let connection = Connection::new(transport);

        let items = cursor(&connection)
            .batch_size(2)
            .try_collect_all()
            .await
            .unwrap();

        assert_eq!(items, numbered(0..5));
        let skips: Vec<u64> = connection
            .transport()
            .queries()
            .iter()
            .map(|(_, request)| request.skip)
            .collect();
        assert_eq!(skips, vec![0, 2, 4]);
    }

    #[tokio::test]
    async fn limit_caps_the_last_batch() {
        let transport = RecordingTransport::new();
        transport.push_batch(numbered(0..2));
        transport.push_batch(numbered(2..3));
        let connection = Connection::new(transport);

        let items = cursor(&connection)
            .batch_size(2)
            .skip(10)
            .limit(3)
            .try_collect_all()
            .await
            .unwrap();

        assert_eq!(items.len(), 3);
        let queries = connection.transport().queries();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[1].1.limit, Some(1));
        assert_eq!(queries[1].1.skip, 12);
        assert_eq!(queries[1].1.selector, doc! { "kind": "a" });
    }

    #[tokio::test]
    async fn zero_limit_never_queries() {
        let connection = Connection::new(RecordingTransport::new());
        let mut cursor = cursor(&connection).limit(0);

        assert!(cursor.next().await.unwrap().is_none());
        assert!(connection.transport().queries().is_empty());
    }

    #[tokio::test]
    async fn stream_yields_every_result() {
        let transport = RecordingTransport::new();
        transport.push_batch(numbered(0..3));
        let connection = Connection::new(transport);

        let items: Vec<Document> = cursor(&connection)
            .into_stream()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(items.len(), 3);
    }

    #[tokio::test]
    async fn decode_failures_surface_from_next() {
        #[derive(Debug, serde::Serialize, serde::Deserialize)]
        struct Strict {
            _id: i32,
            name: String,
        }

        impl crate::document::Descriptor for Strict {
            fn identifier(&self) -> Option<bson::Bson> {
                Some(bson::Bson::Int32(self._id))
            }

            fn set_identifier(&mut self, _: bson::Bson) -> DocumentStoreResult<()> {
                Ok(())
            }
        }

        let transport = RecordingTransport::new();
        transport.push_batch(numbered(0..1));
        let connection = Connection::new(transport);
        let mut cursor: Cursor<'_, _, Strict> =
            Cursor::new(&connection, Namespace::new("app", "items"), doc! {});

        assert!(matches!(cursor.next().await, Err(DocumentStoreError::Serialization(_))));
    }
}
