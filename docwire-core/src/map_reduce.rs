//! Map-reduce command builder.

use bson::{Bson, Document, de::deserialize_from_bson, doc};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

use crate::{
    command::CommandBuilder,
    error::{DocumentStoreError, DocumentStoreResult},
    session::Connection,
    transport::{Namespace, Transport},
};

/// Where map-reduce results go.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MapReduceOutput {
    /// Return the results in the response.
    #[default]
    Inline,
    /// Replace the contents of the named collection.
    Replace(String),
    /// Merge into the named collection, overwriting documents with equal keys.
    Merge(String),
    /// Reduce into the named collection against its existing documents.
    Reduce(String),
}

impl MapReduceOutput {
    fn to_bson(&self) -> Bson {
        Bson::Document(match self {
            MapReduceOutput::Inline => doc! { "inline": 1 },
            MapReduceOutput::Replace(name) => doc! { "replace": name },
            MapReduceOutput::Merge(name) => doc! { "merge": name },
            MapReduceOutput::Reduce(name) => doc! { "reduce": name },
        })
    }
}

/// Builds and runs a `mapreduce` command over one collection.
///
/// Inline results decode into the collection's record type unless the builder is
/// re-projected with [`with_type`](Self::with_type).
///
/// ```ignore
/// let totals: Vec<Document> = orders
///     .map_reduce()
///     .map("function() { emit(this.customer, this.total); }")
///     .reduce("function(key, values) { return Array.sum(values); }")
///     .selector(doc! { "status": "paid" })
///     .inline_results()
///     .await?;
/// ```
#[derive(Debug)]
pub struct MapReduce<'a, B: Transport, T> {
    connection: &'a Connection<B>,
    namespace: Namespace,
    map: Option<String>,
    reduce: Option<String>,
    finalize: Option<String>,
    selector: Option<Document>,
    sort: Option<Document>,
    limit: Option<i64>,
    scope: Option<Document>,
    output: MapReduceOutput,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, B: Transport, T> MapReduce<'a, B, T> {
    pub(crate) fn new(connection: &'a Connection<B>, namespace: Namespace) -> Self {
        Self {
            connection,
            namespace,
            map: None,
            reduce: None,
            finalize: None,
            selector: None,
            sort: None,
            limit: None,
            scope: None,
            output: MapReduceOutput::Inline,
            _marker: PhantomData,
        }
    }

    /// Decodes inline results as `U` instead.
    pub fn with_type<U>(self) -> MapReduce<'a, B, U> {
        MapReduce {
            connection: self.connection,
            namespace: self.namespace,
            map: self.map,
            reduce: self.reduce,
            finalize: self.finalize,
            selector: self.selector,
            sort: self.sort,
            limit: self.limit,
            scope: self.scope,
            output: self.output,
            _marker: PhantomData,
        }
    }

    pub fn map(mut self, function: impl Into<String>) -> Self {
        self.map = Some(function.into());
        self
    }

    pub fn reduce(mut self, function: impl Into<String>) -> Self {
        self.reduce = Some(function.into());
        self
    }

    pub fn finalize(mut self, function: impl Into<String>) -> Self {
        self.finalize = Some(function.into());
        self
    }

    /// Restricts the input documents.
    pub fn selector(mut self, selector: Document) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Global variables visible to the map, reduce and finalize functions.
    pub fn scope(mut self, scope: Document) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn output(mut self, output: MapReduceOutput) -> Self {
        self.output = output;
        self
    }

    /// Builds the command envelope.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidCommand`] when the map or reduce function is missing.
    pub fn command(&self) -> DocumentStoreResult<Document> {
        let (Some(map), Some(reduce)) = (&self.map, &self.reduce) else {
            return Err(DocumentStoreError::InvalidCommand(
                "mapreduce requires both a map and a reduce function".to_string(),
            ));
        };

        let mut command = doc! {
            "mapreduce": self.namespace.collection(),
            "map": Bson::JavaScriptCode(map.clone()),
            "reduce": Bson::JavaScriptCode(reduce.clone()),
            "out": self.output.to_bson(),
        };

        if let Some(selector) = &self.selector {
            command.insert("query", selector.clone());
        }
        if let Some(sort) = &self.sort {
            command.insert("sort", sort.clone());
        }
        if let Some(limit) = self.limit {
            command.insert("limit", limit);
        }
        if let Some(finalize) = &self.finalize {
            command.insert("finalize", Bson::JavaScriptCode(finalize.clone()));
        }
        if let Some(scope) = &self.scope {
            command.insert("scope", scope.clone());
        }

        Ok(command)
    }

    /// Runs the command and returns the raw response.
    pub async fn execute(&self) -> DocumentStoreResult<Document> {
        let command = self.command()?;

        CommandBuilder::new(self.connection, &self.namespace)
            .run(command)
            .await
    }

    /// Runs the command with inline output and decodes each result.
    pub async fn inline_results(self) -> DocumentStoreResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let mut response = self
            .output(MapReduceOutput::Inline)
            .execute()
            .await?;

        match response.remove("results") {
            Some(Bson::Array(results)) => results
                .into_iter()
                .map(|result| deserialize_from_bson::<T>(result).map_err(DocumentStoreError::from))
                .collect(),
            _ => Err(DocumentStoreError::InvalidDocument(
                "mapreduce response carries no `results` array".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingTransport;

    fn builder(connection: &Connection<RecordingTransport>) -> MapReduce<'_, RecordingTransport, Document> {
        MapReduce::new(connection, Namespace::new("shop", "orders"))
    }

    #[test]
    fn command_requires_map_and_reduce() {
        let connection = Connection::new(RecordingTransport::new());

        assert!(matches!(
            builder(&connection).map("function() {}").command(),
            Err(DocumentStoreError::InvalidCommand(_))
        ));
    }

    #[test]
    fn command_carries_every_option() {
        let connection = Connection::new(RecordingTransport::new());
        let command = builder(&connection)
            .map("m")
            .reduce("r")
            .finalize("f")
            .selector(doc! { "status": "paid" })
            .sort(doc! { "customer": 1 })
            .limit(10)
            .scope(doc! { "rate": 2 })
            .output(MapReduceOutput::Merge("totals".to_string()))
            .command()
            .unwrap();

        assert_eq!(
            command,
            doc! {
                "mapreduce": "orders",
                "map": Bson::JavaScriptCode("m".to_string()),
                "reduce": Bson::JavaScriptCode("r".to_string()),
                "out": { "merge": "totals" },
                "query": { "status": "paid" },
                "sort": { "customer": 1 },
                "limit": 10_i64,
                "finalize": Bson::JavaScriptCode("f".to_string()),
                "scope": { "rate": 2 },
            }
        );
    }

    #[tokio::test]
    async fn inline_results_are_decoded() {
        let transport = RecordingTransport::new();
        transport.push_response(Ok(doc! {
            "results": [{ "_id": "ada", "value": 30.0 }, { "_id": "bob", "value": 12.5 }],
            "ok": 1.0,
        }));
        let connection = Connection::new(transport);

        let results: Vec<Document> = builder(&connection)
            .map("m")
            .reduce("r")
            .output(MapReduceOutput::Replace("ignored".to_string()))
            .inline_results()
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        let commands = connection.transport().commands();
        let (database, command) = &commands[0];
        assert_eq!(database, "shop");
        assert_eq!(command.get_document("out").unwrap(), &doc! { "inline": 1 });
    }

    #[derive(Debug, PartialEq, serde::Deserialize)]
    struct Total {
        #[serde(rename = "_id")]
        customer: String,
        value: f64,
    }

    #[tokio::test]
    async fn inline_results_decode_as_the_projected_type() {
        let transport = RecordingTransport::new();
        transport.push_response(Ok(doc! {
            "results": [{ "_id": "ada", "value": 30.0 }],
            "ok": 1.0,
        }));
        let connection = Connection::new(transport);

        let totals = builder(&connection)
            .map("m")
            .reduce("r")
            .with_type::<Total>()
            .inline_results()
            .await
            .unwrap();

        assert_eq!(totals, vec![Total { customer: "ada".to_string(), value: 30.0 }]);
    }
}
