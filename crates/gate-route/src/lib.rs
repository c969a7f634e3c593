//! Pattern-based routing for the HTTP frontend.
//!
//! A route binds a host pattern and a path pattern to a backend handle,
//! optionally guarded by access restrictions. The table is matched in
//! definition order; the first route whose host and path both accept the
//! request wins. The crate is pure decision logic: inputs in, verdict out.

use std::net::SocketAddr;

use ipnet::IpNet;
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("invalid pattern {pattern:?}: {source}")]
    Compile {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Case-insensitive glob with two metacharacters: `*` matches any run of
/// characters, `?` matches exactly one. Every other character is literal.
/// An empty pattern is equivalent to `*`.
#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    matcher: Regex,
}

impl Pattern {
    pub fn compile(pattern: &str) -> Result<Self, PatternError> {
        let raw = if pattern.is_empty() { "*" } else { pattern };
        let escaped = regex::escape(&raw.to_lowercase());
        let anchored = format!("^{}$", escaped.replace("\\*", ".*").replace("\\?", "."));
        let matcher = Regex::new(&anchored).map_err(|source| PatternError::Compile {
            pattern: raw.to_string(),
            source,
        })?;
        Ok(Self {
            raw: raw.to_string(),
            matcher,
        })
    }

    /// The textual pattern this was compiled from (`*` if it was empty).
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// `input` must already be lowercased; the pattern was lowercased at
    /// compile time.
    pub fn matches(&self, input: &str) -> bool {
        self.matcher.is_match(input)
    }

    /// Accepts `path` verbatim or with a trailing `/` appended, so `/foo`
    /// and `/foo/` resolve identically.
    pub fn matches_path(&self, path: &str) -> bool {
        if self.matches(path) {
            return true;
        }
        let mut with_slash = String::with_capacity(path.len() + 1);
        with_slash.push_str(path);
        with_slash.push('/');
        self.matches(&with_slash)
    }
}

/// One access-control clause. Enabled predicates are ORed inside the
/// clause (after per-predicate inversion); `and_after` chains this clause
/// into an AND group with the next one. A completed group that evaluates
/// true denies the request.
#[derive(Debug, Clone, Default)]
pub struct Restriction {
    /// CIDR the remote peer must fall in for the predicate to match.
    pub network: Option<IpNet>,
    /// Path pattern; empty disables the predicate.
    pub path: String,
    /// Negate each enabled predicate before it contributes.
    pub invert: bool,
    /// Continue the AND chain into the next clause.
    pub and_after: bool,
}

#[derive(Debug, Clone)]
struct CompiledRestriction {
    network: Option<IpNet>,
    path: Option<Pattern>,
    invert: bool,
    and_after: bool,
}

impl CompiledRestriction {
    fn compile(restriction: &Restriction) -> Result<Self, PatternError> {
        let path = if restriction.path.is_empty() {
            None
        } else {
            Some(Pattern::compile(&restriction.path)?)
        };
        Ok(Self {
            network: restriction.network,
            path,
            invert: restriction.invert,
            and_after: restriction.and_after,
        })
    }
}

/// A host/path pattern pair bound to a backend handle.
#[derive(Debug, Clone)]
pub struct Route<B> {
    /// Host pattern; empty means `*`.
    pub host: String,
    /// Path pattern; empty means `*`.
    pub path: String,
    pub backend: B,
    pub restrictions: Vec<Restriction>,
}

impl<B> Route<B> {
    pub fn new(host: &str, path: &str, backend: B) -> Self {
        Self {
            host: host.to_string(),
            path: path.to_string(),
            backend,
            restrictions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledRoute<B> {
    host: Pattern,
    path: Pattern,
    backend: B,
    restrictions: Vec<CompiledRestriction>,
}

/// Outcome of a table lookup. `backend` is `None` when a restriction
/// denied the request. `host` and `path` are the pattern strings that
/// matched (`*` for the default backend), ready for telemetry labels.
#[derive(Debug, Clone, Copy)]
pub struct RouteMatch<'a, B> {
    pub backend: Option<&'a B>,
    pub host: &'a str,
    pub path: &'a str,
}

/// Compiled, immutable route table. Built once per frontend; matched
/// concurrently, never mutated.
#[derive(Debug, Clone)]
pub struct RouteTable<B> {
    routes: Vec<CompiledRoute<B>>,
    default_backend: B,
}

impl<B> RouteTable<B> {
    pub fn compile(routes: &[Route<B>], default_backend: B) -> Result<Self, PatternError>
    where
        B: Clone,
    {
        let mut compiled = Vec::with_capacity(routes.len());
        for route in routes {
            let restrictions = route
                .restrictions
                .iter()
                .map(CompiledRestriction::compile)
                .collect::<Result<Vec<_>, _>>()?;
            compiled.push(CompiledRoute {
                host: Pattern::compile(&route.host)?,
                path: Pattern::compile(&route.path)?,
                backend: route.backend.clone(),
                restrictions,
            });
        }
        Ok(Self {
            routes: compiled,
            default_backend,
        })
    }

    /// First-match-wins lookup. `host` and `path` must already be
    /// lowercased; `peer` is the remote address when the transport has one.
    pub fn find(&self, host: &str, path: &str, peer: Option<SocketAddr>) -> RouteMatch<'_, B> {
        for route in &self.routes {
            if route.host.matches(host) && route.path.matches_path(path) {
                let backend = if is_restricted(&route.restrictions, path, peer) {
                    None
                } else {
                    Some(&route.backend)
                };
                return RouteMatch {
                    backend,
                    host: route.host.as_str(),
                    path: route.path.as_str(),
                };
            }
        }
        RouteMatch {
            backend: Some(&self.default_backend),
            host: "*",
            path: "*",
        }
    }
}

fn is_restricted(
    restrictions: &[CompiledRestriction],
    path: &str,
    peer: Option<SocketAddr>,
) -> bool {
    let mut and_ok = true;
    for restriction in restrictions {
        let mut clause_ok = false;
        if let (Some(network), Some(peer)) = (&restriction.network, peer) {
            let mut ok = network.contains(&peer.ip());
            if restriction.invert {
                ok = !ok;
            }
            clause_ok = clause_ok || ok;
        }
        if let Some(pattern) = &restriction.path {
            let mut ok = pattern.matches_path(path);
            if restriction.invert {
                ok = !ok;
            }
            clause_ok = clause_ok || ok;
        }
        if restriction.and_after {
            and_ok = and_ok && clause_ok;
        } else {
            if and_ok && clause_ok {
                return true;
            }
            and_ok = true;
        }
    }
    false
}
