use super::xmlrpc::{RpcTransport, RpcValue};
use super::{Document, Entry, Repository, RepositoryError};
use crate::config::RepositoryKind;
use crate::report::flatten;
use anyhow::{anyhow, Result};

const RENDERED_SPECIFICATION_METHOD: &str = "getRenderedSpecification";

/// Parsed remote locator: `ENDPOINT[?includeStyle=BOOL&handler=NAME]#SPACE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRoot {
    pub endpoint: String,
    pub space: String,
    pub handler: Option<String>,
    pub include_style: bool,
}

impl RemoteRoot {
    pub fn parse(root: &str) -> Result<Self> {
        let (location, space) = root
            .rsplit_once('#')
            .ok_or_else(|| anyhow!("remote root {root:?} has no #SPACE fragment"))?;
        let space = space.trim();
        if space.is_empty() {
            return Err(anyhow!("remote root {root:?} has an empty space"));
        }
        let (endpoint, query) = match location.split_once('?') {
            Some((endpoint, query)) => (endpoint, Some(query)),
            None => (location, None),
        };
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(anyhow!(
                "remote endpoint {endpoint:?} must be an http(s) URL"
            ));
        }

        let mut handler = None;
        let mut include_style = true;
        for pair in query.unwrap_or_default().split('&') {
            if pair.is_empty() {
                continue;
            }
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            match key {
                "handler" if !value.is_empty() => handler = Some(value.to_string()),
                "includeStyle" => {
                    include_style = match value.to_ascii_lowercase().as_str() {
                        "true" | "1" | "yes" => true,
                        "false" | "0" | "no" => false,
                        other => {
                            return Err(anyhow!("invalid includeStyle value {other:?}"));
                        }
                    }
                }
                other => {
                    tracing::debug!(key = other, "ignoring unrecognized remote root parameter");
                }
            }
        }

        Ok(Self {
            endpoint: endpoint.to_string(),
            space: space.to_string(),
            handler,
            include_style,
        })
    }

    /// Fully qualified method name, prefixed by the handler when present.
    pub fn method(&self) -> String {
        match &self.handler {
            Some(handler) => format!("{handler}.{RENDERED_SPECIFICATION_METHOD}"),
            None => RENDERED_SPECIFICATION_METHOD.to_string(),
        }
    }
}

/// Wiki-hosted specifications served already rendered by a remote procedure.
///
/// Resolution never touches the network; each `fetch` is exactly one call.
pub struct RemoteWikiRepository {
    name: String,
    root: RemoteRoot,
    username: String,
    password: String,
    transport: Box<dyn RpcTransport>,
}

impl RemoteWikiRepository {
    pub fn new(
        name: &str,
        root: RemoteRoot,
        username: String,
        password: String,
        transport: Box<dyn RpcTransport>,
    ) -> Self {
        Self {
            name: name.to_string(),
            root,
            username,
            password,
            transport,
        }
    }

    fn call_params(&self, page: &str) -> Vec<RpcValue> {
        vec![
            RpcValue::String(self.username.clone()),
            RpcValue::String(self.password.clone()),
            RpcValue::Array(vec![
                RpcValue::String(self.root.space.clone()),
                RpcValue::String(page.to_string()),
                RpcValue::Boolean(self.root.include_style),
                RpcValue::Boolean(true),
            ]),
        ]
    }
}

fn page_name(identifier: &str) -> &str {
    identifier.trim_matches('/')
}

impl Repository for RemoteWikiRepository {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> RepositoryKind {
        RepositoryKind::RemoteWiki
    }

    fn lookup(&self, identifier: &str) -> Result<(), RepositoryError> {
        // Existence is only known once the page is fetched.
        if page_name(identifier).is_empty() {
            return Err(RepositoryError::not_found(identifier));
        }
        Ok(())
    }

    fn entries(&self, node: &str) -> Result<Vec<Entry>, RepositoryError> {
        self.lookup(node)?;
        Ok(vec![Entry::Leaf(node.to_string())])
    }

    fn fetch(&self, identifier: &str) -> Result<Document, RepositoryError> {
        let page = page_name(identifier);
        if page.is_empty() {
            return Err(RepositoryError::not_found(identifier));
        }
        tracing::info!(
            repository = %self.name,
            space = %self.root.space,
            page,
            "fetching rendered specification"
        );
        let content = self
            .transport
            .call(&self.root.method(), &self.call_params(page))
            .map_err(|source| RepositoryError::Remote {
                identifier: identifier.to_string(),
                source,
            })?;
        Ok(Document {
            identifier: identifier.to_string(),
            content: content.into_bytes(),
        })
    }

    fn report_name(&self, identifier: &str) -> String {
        format!("{}.html", flatten(identifier))
    }
}
