//! Per-transport middleware pipeline.
//!
//! # Responsibilities
//! - Register request/response transforms against an exact method name, a
//!   method pattern, or any method
//! - Look up the transforms that apply to a method, in order
//!
//! # Design Decisions
//! - Lookup order is exact entries, then pattern entries, then wildcard entries
//! - Within each category registration order is preserved
//! - Patterns are globs (`*` matches any run of characters); no regex so
//!   matching stays linear

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::rpc::RpcRequest;

/// Transform applied to an outgoing payload.
pub type RequestTransform = Arc<dyn Fn(RpcRequest) -> RpcRequest + Send + Sync>;

/// Transform applied to a raw response before it is wrapped.
pub type ResponseTransform = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// A glob over method names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodPattern {
    pattern: String,
}

impl MethodPattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Returns true if `method` matches this glob.
    pub fn matches(&self, method: &str) -> bool {
        let pattern = self.pattern.as_bytes();
        let text = method.as_bytes();

        let (mut p, mut t) = (0, 0);
        let mut star: Option<usize> = None;
        let mut resume = 0;

        while t < text.len() {
            if p < pattern.len() && pattern[p] == b'*' {
                star = Some(p);
                p += 1;
                resume = t;
            } else if p < pattern.len() && pattern[p] == text[t] {
                p += 1;
                t += 1;
            } else if let Some(s) = star {
                p = s + 1;
                resume += 1;
                t = resume;
            } else {
                return false;
            }
        }

        pattern[p..].iter().all(|&c| c == b'*')
    }
}

/// What a transform is registered against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchKey {
    Exact(String),
    Pattern(MethodPattern),
    Any,
}

impl From<&str> for MatchKey {
    /// `"*"` is the wildcard, anything else containing `*` is a pattern.
    fn from(key: &str) -> Self {
        if key == "*" {
            MatchKey::Any
        } else if key.contains('*') {
            MatchKey::Pattern(MethodPattern::new(key))
        } else {
            MatchKey::Exact(key.to_string())
        }
    }
}

impl From<String> for MatchKey {
    fn from(key: String) -> Self {
        MatchKey::from(key.as_str())
    }
}

#[derive(Clone)]
struct Registry<T> {
    exact: HashMap<String, Vec<T>>,
    patterns: Vec<(MethodPattern, Vec<T>)>,
    any: Vec<T>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            exact: HashMap::new(),
            patterns: Vec::new(),
            any: Vec::new(),
        }
    }
}

impl<T: Clone> Registry<T> {
    fn register(&mut self, key: MatchKey, transform: T) {
        match key {
            MatchKey::Exact(method) => self.exact.entry(method).or_default().push(transform),
            MatchKey::Pattern(pattern) => {
                match self.patterns.iter_mut().find(|(p, _)| *p == pattern) {
                    Some((_, list)) => list.push(transform),
                    None => self.patterns.push((pattern, vec![transform])),
                }
            }
            MatchKey::Any => self.any.push(transform),
        }
    }

    fn lookup(&self, method: &str) -> Vec<T> {
        let mut out = Vec::new();
        if let Some(list) = self.exact.get(method) {
            out.extend(list.iter().cloned());
        }
        for (pattern, list) in &self.patterns {
            if pattern.matches(method) {
                out.extend(list.iter().cloned());
            }
        }
        out.extend(self.any.iter().cloned());
        out
    }

    fn len(&self) -> usize {
        self.exact.values().map(Vec::len).sum::<usize>()
            + self.patterns.iter().map(|(_, l)| l.len()).sum::<usize>()
            + self.any.len()
    }
}

/// Request and response transforms owned by one transport.
#[derive(Default)]
pub struct MiddlewareRegistry {
    request: RwLock<Registry<RequestTransform>>,
    response: RwLock<Registry<ResponseTransform>>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request transform.
    pub fn use_request<F>(&self, key: impl Into<MatchKey>, transform: F)
    where
        F: Fn(RpcRequest) -> RpcRequest + Send + Sync + 'static,
    {
        if let Ok(mut registry) = self.request.write() {
            registry.register(key.into(), Arc::new(transform));
        }
    }

    /// Register a response transform.
    pub fn use_response<F>(&self, key: impl Into<MatchKey>, transform: F)
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        if let Ok(mut registry) = self.response.write() {
            registry.register(key.into(), Arc::new(transform));
        }
    }

    /// Transforms applying to `method`, as `(request, response)`.
    pub fn get_middleware(&self, method: &str) -> (Vec<RequestTransform>, Vec<ResponseTransform>) {
        let request = self
            .request
            .read()
            .map(|r| r.lookup(method))
            .unwrap_or_default();
        let response = self
            .response
            .read()
            .map(|r| r.lookup(method))
            .unwrap_or_default();
        (request, response)
    }

    /// Fold `payload` through the request transforms for its method.
    pub fn apply_request(&self, payload: RpcRequest) -> RpcRequest {
        let (request, _) = self.get_middleware(&payload.method);
        request.iter().fold(payload, |p, f| f(p))
    }

    /// Fold a raw response through the response transforms for `method`.
    pub fn apply_response(&self, method: &str, raw: Value) -> Value {
        let (_, response) = self.get_middleware(method);
        response.iter().fold(raw, |r, f| f(r))
    }
}

impl std::fmt::Debug for MiddlewareRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareRegistry")
            .field("request", &self.request.read().map(|r| r.len()).unwrap_or(0))
            .field("response", &self.response.read().map(|r| r.len()).unwrap_or(0))
            .finish()
    }
}
