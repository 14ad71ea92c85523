//! In-memory catalog for tests and offline replay
//!
//! Responses are scripted against an SQL fragment: the most recently added
//! rule whose fragment occurs in the executed SQL answers the query. Scripting
//! the same fragment again queues another response; queued responses are
//! handed out in order and the last one keeps repeating.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::db::connection::{CatalogConnection, CatalogRow};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
enum Scripted {
    Rows(Vec<CatalogRow>),
    Failure(String),
    Disconnect(String),
}

#[derive(Debug)]
struct Rule {
    needle: String,
    responses: VecDeque<Scripted>,
}

/// A query the catalog received
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedQuery {
    pub sql: String,
    pub params: Vec<String>,
}

/// Scripted [`CatalogConnection`]
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    rules: Mutex<Vec<Rule>>,
    queries: Mutex<Vec<RecordedQuery>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer queries containing `needle` with `rows`
    pub fn respond(self, needle: &str, rows: Vec<CatalogRow>) -> Self {
        self.script(needle, Scripted::Rows(rows))
    }

    /// Fail queries containing `needle` with a driver error
    pub fn fail(self, needle: &str, message: &str) -> Self {
        self.script(needle, Scripted::Failure(message.to_string()))
    }

    /// Fail queries containing `needle` as if the connection dropped
    pub fn disconnect(self, needle: &str, message: &str) -> Self {
        self.script(needle, Scripted::Disconnect(message.to_string()))
    }

    fn script(self, needle: &str, response: Scripted) -> Self {
        if let Ok(mut rules) = self.rules.lock() {
            match rules.iter_mut().find(|rule| rule.needle == needle) {
                Some(rule) => rule.responses.push_back(response),
                None => rules.push(Rule {
                    needle: needle.to_string(),
                    responses: VecDeque::from([response]),
                }),
            }
        }
        self
    }

    /// Every query received so far, in order
    pub fn queries(&self) -> Vec<RecordedQuery> {
        self.queries
            .lock()
            .map(|queries| queries.clone())
            .unwrap_or_default()
    }

    /// Queries whose SQL contains `needle`
    pub fn queries_matching(&self, needle: &str) -> Vec<RecordedQuery> {
        self.queries()
            .into_iter()
            .filter(|q| q.sql.contains(needle))
            .collect()
    }

    fn next_response(&self, sql: &str) -> Result<Option<Scripted>> {
        let mut rules = self
            .rules
            .lock()
            .map_err(|_| Error::ConnectionFailure("Memory catalog lock poisoned".to_string()))?;

        let Some(rule) = rules.iter_mut().rev().find(|rule| sql.contains(&rule.needle)) else {
            return Ok(None);
        };

        let response = if rule.responses.len() > 1 {
            rule.responses.pop_front()
        } else {
            rule.responses.front().cloned()
        };

        Ok(response)
    }
}

#[async_trait]
impl CatalogConnection for MemoryCatalog {
    async fn fetch_all(&self, sql: &str, params: &[&str]) -> Result<Vec<CatalogRow>> {
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(RecordedQuery {
                sql: sql.to_string(),
                params: params.iter().map(|p| p.to_string()).collect(),
            });
        }

        match self.next_response(sql)? {
            Some(Scripted::Rows(rows)) => Ok(rows),
            Some(Scripted::Failure(message)) => Err(Error::SqlxError(sqlx::Error::Protocol(message))),
            Some(Scripted::Disconnect(message)) => Err(Error::ConnectionFailure(message)),
            None => Ok(Vec::new()),
        }
    }
}
