//! Radix-tree request router.
//!
//! One tree per HTTP method. Each leaf holds the route's template and its
//! complete handler chain (global handlers already prepended), so a lookup
//! hands the dispatcher everything it needs for the request.

use std::collections::HashMap;
use std::sync::Arc;

use matchit::Router as MatchitRouter;

use crate::handler::Handler;
use crate::method::Method;

/// Route parameters bound by a lookup, in template order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, String)>);

impl Params {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub(crate) fn clear(&mut self) { self.0.clear() }
}

impl From<Vec<(String, String)>> for Params {
    fn from(pairs: Vec<(String, String)>) -> Self { Self(pairs) }
}

/// A matched route.
pub(crate) struct Route {
    pub(crate) template: Arc<str>,
    pub(crate) handlers: Arc<[Handler]>,
}

#[derive(Default)]
pub(crate) struct Router {
    trees: HashMap<Method, MatchitRouter<Arc<Route>>>,
}

impl Router {
    /// Registers `handlers` under `method` + `template`.
    ///
    /// # Panics
    ///
    /// Panics on a malformed template or one that conflicts with a route
    /// already registered for the same method.
    pub(crate) fn insert(&mut self, method: Method, template: &str, handlers: Arc<[Handler]>) {
        let route = Arc::new(Route { template: template.into(), handlers });
        self.trees
            .entry(method)
            .or_default()
            .insert(to_matchit(template), route)
            .unwrap_or_else(|e| panic!("invalid route `{method} {template}`: {e}"));
    }

    pub(crate) fn lookup(&self, method: Method, path: &str) -> Option<(Arc<Route>, Params)> {
        let tree = self.trees.get(&method)?;
        let matched = tree.at(path).ok()?;
        let params = matched.params.iter().map(|(k, v)| (k.to_owned(), v.to_owned())).collect();
        Some((Arc::clone(matched.value), Params(params)))
    }
}

/// Rewrites `:name` and `*name` segments into matchit's `{name}` / `{*name}`.
/// Templates already written with braces pass through unchanged.
fn to_matchit(template: &str) -> String {
    let mut out = String::with_capacity(template.len() + 4);
    for (i, segment) in template.split('/').enumerate() {
        if i != 0 {
            out.push('/');
        }
        if let Some(name) = segment.strip_prefix(':') {
            out.push('{');
            out.push_str(name);
            out.push('}');
        } else if let Some(name) = segment.strip_prefix('*') {
            out.push_str("{*");
            out.push_str(name);
            out.push('}');
        } else {
            out.push_str(segment);
        }
    }
    out
}
