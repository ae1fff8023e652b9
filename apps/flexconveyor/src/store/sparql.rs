//! # Remote SPARQL Store
//!
//! A `StoreClient` for an RDF4J/GraphDB repository.
//!
//! Queries are sent to `{endpoint}/repositories/{repository}` and updates to
//! `{endpoint}/repositories/{repository}/statements`, both as form posts.
//! The client is blocking: create, use and drop it off the async runtime
//! (the app does all of that inside `spawn_blocking`).
//!
//! A conditioned update runs inside one serializable repository transaction
//! (`/transactions`): the precondition ASKs, the update and the commit all
//! see the same state, and a commit that conflicts with another writer is
//! reported as a failed precondition. A failed precondition rolls back.
//!
//! Identifiers that look like absolute IRIs are written as `<iri>`; any
//! other object is written as a plain string literal.

use crate::config::SparqlConfig;
use flexconveyor_core::{
    Bindings, ConveyorError, GraphPattern, StoreClient, Term, Triple, TriplePattern,
    UpdateReceipt, store::require_bound,
};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, CONTENT_TYPE, LOCATION};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

const SPARQL_RESULTS_JSON: &str = "application/sparql-results+json";
const SPARQL_QUERY: &str = "application/sparql-query";
const SPARQL_UPDATE: &str = "application/sparql-update";

/// Isolation level requested for conditioned updates.
const SERIALIZABLE: &str = "http://www.openrdf.org/schema/sesame#SERIALIZABLE";

/// Characters that may never appear inside `<...>`.
const FORBIDDEN_IRI_CHARS: &[char] = &['<', '>', '"', '{', '}', '|', '^', '`', '\\'];

// =============================================================================
// RESULT FORMAT
// =============================================================================

#[derive(Debug, Deserialize)]
struct SelectResults {
    results: ResultSet,
}

#[derive(Debug, Deserialize)]
struct ResultSet {
    bindings: Vec<BTreeMap<String, RdfValue>>,
}

#[derive(Debug, Deserialize)]
struct RdfValue {
    value: String,
}

#[derive(Debug, Deserialize)]
struct AskResult {
    boolean: bool,
}

// =============================================================================
// STORE
// =============================================================================

/// Blocking client for one remote repository.
pub struct SparqlStore {
    client: Client,
    query_url: String,
    update_url: String,
    transactions_url: String,
    credentials: Option<(String, Option<String>)>,
}

impl std::fmt::Debug for SparqlStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SparqlStore")
            .field("query_url", &self.query_url)
            .field("update_url", &self.update_url)
            .field("transactions_url", &self.transactions_url)
            .finish_non_exhaustive()
    }
}

impl SparqlStore {
    /// Build a client for the configured repository. No request is sent.
    pub fn new(config: &SparqlConfig) -> Result<Self, ConveyorError> {
        config.validate()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ConveyorError::Connectivity(format!("HTTP client: {}", e)))?;

        let base = format!(
            "{}/repositories/{}",
            config.endpoint.trim_end_matches('/'),
            config.repository
        );
        Ok(Self {
            client,
            update_url: format!("{base}/statements"),
            transactions_url: format!("{base}/transactions"),
            query_url: base,
            credentials: config
                .username
                .clone()
                .map(|user| (user, config.password.clone())),
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some((user, password)) => request.basic_auth(user, password.as_deref()),
            None => request,
        }
    }

    /// POST a query and return the response body.
    fn send_query(&self, query: &str) -> Result<String, ConveyorError> {
        tracing::trace!(%query, "sparql query");
        let request = self
            .client
            .post(&self.query_url)
            .header(ACCEPT, SPARQL_RESULTS_JSON)
            .form(&[("query", query)]);
        send(self.authorize(request))
    }

    /// POST an update. The body of a successful update is ignored.
    fn send_update(&self, update: &str) -> Result<(), ConveyorError> {
        tracing::trace!(%update, "sparql update");
        let request = self.client.post(&self.update_url).form(&[("update", update)]);
        send(self.authorize(request)).map(|_| ())
    }

    fn select(&self, pattern: &GraphPattern) -> Result<Vec<Bindings>, ConveyorError> {
        let body = self.send_query(&render_select(pattern)?)?;
        parse_select(&body)
    }

    /// Open a serializable transaction on the repository.
    fn begin(&self) -> Result<Transaction<'_>, ConveyorError> {
        let request = self
            .client
            .post(&self.transactions_url)
            .query(&[("isolation-level", SERIALIZABLE)]);
        let response = dispatch(self.authorize(request))?;
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let status = response.status();
        check_status(status, &read_body(response)?)?;

        let location = location.ok_or_else(|| {
            ConveyorError::Connectivity("transaction opened without a Location header".to_string())
        })?;
        let url = resolve_location(&self.transactions_url, &location)?;
        tracing::trace!(%url, "sparql transaction opened");
        Ok(Transaction { store: self, url })
    }
}

/// An open repository transaction. Ends with `commit` or `rollback`.
struct Transaction<'a> {
    store: &'a SparqlStore,
    url: Url,
}

impl Transaction<'_> {
    fn action(&self, action: &str) -> RequestBuilder {
        let request = self
            .store
            .client
            .put(self.url.clone())
            .query(&[("action", action)]);
        self.store.authorize(request)
    }

    fn ask(&self, triples: &[Triple]) -> Result<bool, ConveyorError> {
        let request = self
            .action("QUERY")
            .header(CONTENT_TYPE, SPARQL_QUERY)
            .header(ACCEPT, SPARQL_RESULTS_JSON)
            .body(render_ask(triples)?);
        parse_ask(&send(request)?)
    }

    /// The members of `triples` the transaction does not see.
    fn missing(&self, triples: &[Triple]) -> Result<Vec<Triple>, ConveyorError> {
        let mut missing = Vec::new();
        for triple in triples {
            if !self.ask(std::slice::from_ref(triple))? {
                missing.push(triple.clone());
            }
        }
        Ok(missing)
    }

    /// Check that `old` holds, then replace it with `new`. Nothing is
    /// visible outside the transaction until `commit`.
    fn replace(&self, old: &[Triple], new: &[Triple]) -> Result<(), ConveyorError> {
        let missing = self.missing(old)?;
        if !missing.is_empty() {
            return Err(ConveyorError::PreconditionFailed { missing });
        }
        let request = self
            .action("UPDATE")
            .header(CONTENT_TYPE, SPARQL_UPDATE)
            .body(render_guarded_update(old, new)?);
        send(request).map(|_| ())
    }

    fn commit(self, old: &[Triple]) -> Result<(), ConveyorError> {
        let response = dispatch(self.action("COMMIT"))?;
        let status = response.status();
        commit_outcome(status, &read_body(response)?, old)
    }

    /// Best effort: the server also drops abandoned transactions.
    fn rollback(self) {
        let request = self.store.authorize(self.store.client.delete(self.url.clone()));
        if let Err(e) = send(request) {
            tracing::warn!(url = %self.url, "Transaction rollback failed: {}", e);
        }
    }
}

fn dispatch(request: RequestBuilder) -> Result<Response, ConveyorError> {
    request
        .send()
        .map_err(|e| ConveyorError::Connectivity(format!("SPARQL request failed: {}", e)))
}

fn read_body(response: Response) -> Result<String, ConveyorError> {
    response
        .text()
        .map_err(|e| ConveyorError::Connectivity(format!("SPARQL response unreadable: {}", e)))
}

fn check_status(status: StatusCode, body: &str) -> Result<(), ConveyorError> {
    if status.is_success() {
        return Ok(());
    }
    Err(ConveyorError::Connectivity(format!(
        "SPARQL endpoint returned {}: {}",
        status,
        body.trim()
    )))
}

/// Send a request, mapping transport failures and error statuses to
/// connectivity errors.
fn send(request: RequestBuilder) -> Result<String, ConveyorError> {
    let response = dispatch(request)?;
    let status = response.status();
    let body = read_body(response)?;
    check_status(status, &body)?;
    Ok(body)
}

/// A commit refused with 409 lost against a concurrent writer.
fn commit_outcome(status: StatusCode, body: &str, old: &[Triple]) -> Result<(), ConveyorError> {
    if status == StatusCode::CONFLICT {
        return Err(ConveyorError::PreconditionFailed {
            missing: old.to_vec(),
        });
    }
    check_status(status, body)
}

/// The transaction URL from a `Location` header, absolute or relative.
fn resolve_location(transactions_url: &str, location: &str) -> Result<Url, ConveyorError> {
    Url::parse(transactions_url)
        .and_then(|base| base.join(location))
        .map_err(|e| ConveyorError::Connectivity(format!("bad transaction location: {}", e)))
}

impl StoreClient for SparqlStore {
    fn query(&self, pattern: &GraphPattern) -> Result<Vec<Bindings>, ConveyorError> {
        self.select(pattern)
    }

    fn facts_get(
        &self,
        subject: Option<&str>,
        predicate: Option<&str>,
        object: Option<&str>,
    ) -> Result<Vec<Triple>, ConveyorError> {
        require_bound(subject, predicate, object)?;
        let term = |value: Option<&str>, var: &str| match value {
            Some(v) => Term::iri(v),
            None => Term::var(var),
        };
        let pattern = GraphPattern::single(
            term(subject, "s"),
            term(predicate, "p"),
            term(object, "o"),
        );

        let pick = |row: &Bindings, value: Option<&str>, var: &str| {
            value
                .map(str::to_string)
                .or_else(|| row.get(var).cloned())
                .ok_or_else(|| ConveyorError::Serialization(format!("unbound ?{var} in result")))
        };
        self.select(&pattern)?
            .iter()
            .map(|row| {
                Ok(Triple::new(
                    pick(row, subject, "s")?,
                    pick(row, predicate, "p")?,
                    pick(row, object, "o")?,
                ))
            })
            .collect()
    }

    fn facts_add(&self, triples: &[Triple]) -> Result<(), ConveyorError> {
        if triples.is_empty() {
            return Ok(());
        }
        self.send_update(&format!("INSERT DATA {{ {} }}", render_triples(triples)?))
    }

    fn facts_delete(&self, triples: &[Triple]) -> Result<(), ConveyorError> {
        if triples.is_empty() {
            return Ok(());
        }
        self.send_update(&format!("DELETE DATA {{ {} }}", render_triples(triples)?))
    }

    fn facts_update(
        &self,
        old: &[Triple],
        new: &[Triple],
        check_exist: bool,
    ) -> Result<UpdateReceipt, ConveyorError> {
        let receipt = UpdateReceipt {
            removed: old.len(),
            inserted: new.len(),
        };
        if !check_exist || old.is_empty() {
            let mut parts = Vec::new();
            if !old.is_empty() {
                parts.push(format!("DELETE DATA {{ {} }}", render_triples(old)?));
            }
            if !new.is_empty() {
                parts.push(format!("INSERT DATA {{ {} }}", render_triples(new)?));
            }
            if !parts.is_empty() {
                self.send_update(&parts.join(" ;\n"))?;
            }
            return Ok(receipt);
        }

        let transaction = self.begin()?;
        match transaction.replace(old, new) {
            Ok(()) => transaction.commit(old)?,
            Err(e) => {
                transaction.rollback();
                return Err(e);
            }
        }
        Ok(receipt)
    }
}

// =============================================================================
// RENDERING
// =============================================================================

/// Whether `value` starts with a URI scheme.
fn is_iri(value: &str) -> bool {
    let Some((scheme, _)) = value.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn render_iri(value: &str) -> Result<String, ConveyorError> {
    if !is_iri(value)
        || value
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || FORBIDDEN_IRI_CHARS.contains(&c))
    {
        return Err(ConveyorError::InvalidIdentifier(value.to_string()));
    }
    Ok(format!("<{value}>"))
}

fn render_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

fn render_var(name: &str) -> Result<String, ConveyorError> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ConveyorError::InvalidIdentifier(format!("?{name}")));
    }
    Ok(format!("?{name}"))
}

/// Subjects and predicates must be IRIs; objects may be literals.
fn render_term(term: &Term, object_position: bool) -> Result<String, ConveyorError> {
    match term {
        Term::Var(name) => render_var(name),
        Term::Iri(value) if object_position && !is_iri(value) => Ok(render_literal(value)),
        Term::Iri(value) => render_iri(value),
    }
}

fn render_pattern(pattern: &TriplePattern) -> Result<String, ConveyorError> {
    Ok(format!(
        "{} {} {} .",
        render_term(&pattern.subject, false)?,
        render_term(&pattern.predicate, false)?,
        render_term(&pattern.object, true)?
    ))
}

fn render_select(pattern: &GraphPattern) -> Result<String, ConveyorError> {
    let body = pattern
        .patterns()
        .iter()
        .map(render_pattern)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(format!("SELECT * WHERE {{ {} }}", body.join(" ")))
}

fn render_ask(triples: &[Triple]) -> Result<String, ConveyorError> {
    Ok(format!("ASK {{ {} }}", render_triples(triples)?))
}

fn render_triples(triples: &[Triple]) -> Result<String, ConveyorError> {
    let body = triples
        .iter()
        .map(|t| {
            render_pattern(&TriplePattern::new(
                Term::iri(t.subject.as_str()),
                Term::iri(t.predicate.as_str()),
                Term::iri(t.object.as_str()),
            ))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(body.join(" "))
}

/// `DELETE {old} INSERT {new} WHERE {old}`: applies only while `old` holds.
fn render_guarded_update(old: &[Triple], new: &[Triple]) -> Result<String, ConveyorError> {
    let old = render_triples(old)?;
    Ok(format!(
        "DELETE {{ {old} }} INSERT {{ {} }} WHERE {{ {old} }}",
        render_triples(new)?
    ))
}

fn parse_select(body: &str) -> Result<Vec<Bindings>, ConveyorError> {
    let results: SelectResults = serde_json::from_str(body)
        .map_err(|e| ConveyorError::Serialization(format!("SPARQL results: {}", e)))?;
    Ok(results
        .results
        .bindings
        .into_iter()
        .map(|row| row.into_iter().map(|(k, v)| (k, v.value)).collect())
        .collect())
}

fn parse_ask(body: &str) -> Result<bool, ConveyorError> {
    let result: AskResult = serde_json::from_str(body)
        .map_err(|e| ConveyorError::Serialization(format!("SPARQL ASK result: {}", e)))?;
    Ok(result.boolean)
}

// =============================================================================
// TESTS
// =============================================================================
