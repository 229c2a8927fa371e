//! Application builder.
//!
//! Everything a server needs is registered on an [`App`] before serving
//! starts. [`App::build`] freezes it into a [`Dispatcher`], which is
//! immutable apart from its lifecycle status and therefore safe to share
//! with every connection task.
//!
//! ```rust
//! use catena::{App, BoxFuture, Context, Error, Group, Handler, HandlerResult};
//!
//! fn get_user(ctx: &mut Context) -> BoxFuture<'_, HandlerResult> {
//!     Box::pin(async move {
//!         let id = ctx.param("id").unwrap_or_default().to_owned();
//!         ctx.write(id.as_bytes());
//!         Ok(())
//!     })
//! }
//!
//! let admin = Group::new("/admin", []).get("/users/:id", [Handler::new(get_user)]);
//!
//! let dispatcher = App::new()
//!     .validator("id", |value| {
//!         if value.bytes().all(|b| b.is_ascii_digit()) {
//!             Ok(())
//!         } else {
//!             Err(Error::invalid_param("id", "digits only"))
//!         }
//!     })
//!     .get("/users/:id", [Handler::new(get_user)])
//!     .group(admin)
//!     .build();
//!
//! assert_eq!(dispatcher.routers().len(), 2);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use http::request::Parts;

use crate::context::Context;
use crate::dispatcher::{Dispatcher, Shared, Validators};
use crate::error::Error;
use crate::handler::Handler;
use crate::method::Method;
use crate::response::ResponseBody;
use crate::router::Router;
use crate::signed_keys::SignedKeysGenerator;
use crate::trace::TraceInfos;

/// Checks one route parameter value.
pub type Validator = Arc<dyn Fn(&str) -> Result<(), Error> + Send + Sync>;
/// Runs before route lookup and may rewrite the request head.
pub type PreHandler = Arc<dyn Fn(&mut Parts) + Send + Sync>;
/// Observes every error a chain returns and every streaming failure.
pub type ErrorListener = Arc<dyn Fn(&Context, &Error) + Send + Sync>;
/// Receives the self-time trace of each traced request.
pub type TraceListener = Arc<dyn Fn(&mut Context, &TraceInfos) + Send + Sync>;
/// Turns an unhandled chain error into the response status and body.
pub type ErrorHandler = Arc<dyn Fn(&mut Context, &Error) + Send + Sync>;
/// Answers requests no route matches.
pub type NotFoundHandler = Arc<dyn Fn(&Parts) -> http::Response<ResponseBody> + Send + Sync>;
/// Produces the per-request identifier.
pub type GenerateId = Arc<dyn Fn() -> String + Send + Sync>;

/// A registered `method path` pair, kept for introspection only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouterInfo {
    pub method: Method,
    pub path: String,
}

struct RouteSpec {
    method: Method,
    path: String,
    handlers: Vec<Handler>,
}

macro_rules! method_helpers {
    ($($name:ident => $method:ident),* $(,)?) => {
        $(
            #[doc = concat!("Registers a `", stringify!($method), "` route.")]
            pub fn $name(self, path: &str, handlers: impl IntoIterator<Item = Handler>) -> Self {
                self.on(Method::$method, path, handlers)
            }
        )*

        /// Registers the route for every method in [`Method::ALL`].
        pub fn all(mut self, path: &str, handlers: impl IntoIterator<Item = Handler>) -> Self {
            let handlers: Vec<Handler> = handlers.into_iter().collect();
            for method in Method::ALL {
                self = self.on(method, path, handlers.iter().cloned());
            }
            self
        }
    };
}

// ── App ───────────────────────────────────────────────────────────────────────

/// Server configuration, assembled before serving begins.
pub struct App {
    globals: Vec<Handler>,
    pre: Vec<PreHandler>,
    routes: Vec<RouteSpec>,
    validators: HashMap<String, Validator>,
    error_listeners: Vec<ErrorListener>,
    trace_listeners: Vec<TraceListener>,
    error_handler: Option<ErrorHandler>,
    not_found: Option<NotFoundHandler>,
    generate_id: Option<GenerateId>,
    trace: bool,
    signed_keys: Option<Arc<dyn SignedKeysGenerator>>,
}

impl App {
    pub fn new() -> Self {
        Self {
            globals: Vec::new(),
            pre: Vec::new(),
            routes: Vec::new(),
            validators: HashMap::new(),
            error_listeners: Vec::new(),
            trace_listeners: Vec::new(),
            error_handler: None,
            not_found: None,
            generate_id: None,
            trace: false,
            signed_keys: None,
        }
    }

    /// Appends a global handler. Globals run, in registration order, ahead
    /// of every route's own handlers.
    pub fn use_handler(mut self, handler: Handler) -> Self {
        self.globals.push(handler);
        self
    }

    pub fn use_handlers(mut self, handlers: impl IntoIterator<Item = Handler>) -> Self {
        self.globals.extend(handlers);
        self
    }

    /// Adds a pre-route hook. Hooks run before the route lookup, so a path
    /// rewrite here changes which route matches.
    pub fn pre(mut self, f: impl Fn(&mut Parts) + Send + Sync + 'static) -> Self {
        self.pre.push(Arc::new(f));
        self
    }

    /// Registers `handlers` for `method` + `path`.
    ///
    /// Templates use `:name` for a segment and `*name` for the remainder;
    /// matchit's `{name}` / `{*name}` spelling is accepted too. An invalid
    /// or conflicting template panics in [`build`](Self::build).
    pub fn on(mut self, method: Method, path: &str, handlers: impl IntoIterator<Item = Handler>) -> Self {
        self.routes.push(RouteSpec {
            method,
            path: path.to_owned(),
            handlers: handlers.into_iter().collect(),
        });
        self
    }

    method_helpers! {
        get => Get,
        post => Post,
        put => Put,
        patch => Patch,
        delete => Delete,
        head => Head,
        options => Options,
        trace => Trace,
    }

    /// Expands a group into flat routes: prefix joined to each path, group
    /// handlers ahead of the route's own.
    pub fn group(mut self, group: Group) -> Self {
        let Group { prefix, handlers, routes } = group;
        for route in routes {
            let mut chain = handlers.clone();
            chain.extend(route.handlers);
            self.routes.push(RouteSpec {
                method: route.method,
                path: format!("{prefix}{}", route.path),
                handlers: chain,
            });
        }
        self
    }

    /// Validates the route parameter `name` right before the route's final
    /// handler runs. Registering the same name again replaces the validator.
    pub fn validator(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&str) -> Result<(), Error> + Send + Sync + 'static,
    ) -> Self {
        self.validators.insert(name.into(), Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&Context, &Error) + Send + Sync + 'static) -> Self {
        self.error_listeners.push(Arc::new(f));
        self
    }

    pub fn on_trace(mut self, f: impl Fn(&mut Context, &TraceInfos) + Send + Sync + 'static) -> Self {
        self.trace_listeners.push(Arc::new(f));
        self
    }

    /// Replaces the default error mapper. The mapper fills in status,
    /// headers and body on the context; cache validators are already cleared.
    pub fn error_handler(mut self, f: impl Fn(&mut Context, &Error) + Send + Sync + 'static) -> Self {
        self.error_handler = Some(Arc::new(f));
        self
    }

    pub fn not_found_handler(
        mut self,
        f: impl Fn(&Parts) -> http::Response<ResponseBody> + Send + Sync + 'static,
    ) -> Self {
        self.not_found = Some(Arc::new(f));
        self
    }

    pub fn generate_id(mut self, f: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.generate_id = Some(Arc::new(f));
        self
    }

    /// Records per-handler timings and hands them to the trace listeners.
    pub fn enable_trace(mut self, enabled: bool) -> Self {
        self.trace = enabled;
        self
    }

    pub fn signed_keys(mut self, keys: Arc<dyn SignedKeysGenerator>) -> Self {
        self.signed_keys = Some(keys);
        self
    }

    /// Freezes the configuration.
    ///
    /// # Panics
    ///
    /// Panics if a route template is invalid or conflicts with another route
    /// of the same method.
    pub fn build(self) -> Dispatcher {
        let mut router = Router::default();
        let mut routers = Vec::with_capacity(self.routes.len());
        for route in self.routes {
            let chain: Arc<[Handler]> = self.globals.iter().cloned().chain(route.handlers).collect();
            router.insert(route.method, &route.path, chain);
            routers.push(RouterInfo { method: route.method, path: route.path });
        }

        let validators = (!self.validators.is_empty()).then(|| Arc::new(Validators::new(self.validators)));

        Dispatcher::new(Shared {
            router,
            routers,
            pre: self.pre,
            validators,
            error_listeners: self.error_listeners,
            trace_listeners: self.trace_listeners,
            error_handler: self.error_handler,
            not_found: self.not_found,
            generate_id: self.generate_id,
            trace: self.trace,
            signed_keys: self.signed_keys,
        })
    }
}

impl Default for App {
    fn default() -> Self { Self::new() }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("globals", &self.globals)
            .field("routes", &self.routes.len())
            .field("trace", &self.trace)
            .finish_non_exhaustive()
    }
}

// ── Group ─────────────────────────────────────────────────────────────────────

/// Routes sharing a path prefix and leading handlers.
///
/// A group only exists at registration time; [`App::group`] flattens it.
pub struct Group {
    prefix: String,
    handlers: Vec<Handler>,
    routes: Vec<RouteSpec>,
}

impl Group {
    pub fn new(prefix: impl Into<String>, handlers: impl IntoIterator<Item = Handler>) -> Self {
        Self {
            prefix: prefix.into(),
            handlers: handlers.into_iter().collect(),
            routes: Vec::new(),
        }
    }

    pub fn on(mut self, method: Method, path: &str, handlers: impl IntoIterator<Item = Handler>) -> Self {
        self.routes.push(RouteSpec {
            method,
            path: path.to_owned(),
            handlers: handlers.into_iter().collect(),
        });
        self
    }

    method_helpers! {
        get => Get,
        post => Post,
        put => Put,
        patch => Patch,
        delete => Delete,
        head => Head,
        options => Options,
        trace => Trace,
    }
}
