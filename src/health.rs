//! Built-in Kubernetes health-check handlers.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? Failure → restart. |
//! | **Readiness** | `/readyz` | Can the pod serve traffic? Failure → pulled from load-balancer. |
//!
//! Register them like any other handler:
//!
//! ```rust,no_run
//! use catena::{App, Handler, health};
//!
//! let app = App::new()
//!     .get("/healthz", [Handler::new(health::liveness)])
//!     .get("/readyz", [Handler::new(health::readiness)]);
//! ```
//!
//! Replace `readiness` with your own handler if the pod must also wait for
//! dependencies (database connections, downstream services, etc.).

use crate::context::Context;
use crate::dispatcher::Lifecycle;
use crate::handler::{BoxFuture, HandlerResult};
use crate::response::ContentType;

/// Always `200 OK` with body `"ok"`. If the process can answer HTTP at all,
/// it is alive.
pub fn liveness(ctx: &mut Context) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        ctx.set_content_type(ContentType::Text);
        ctx.write(b"ok");
        Ok(())
    })
}

/// `200 OK` with body `"ready"` while the dispatcher is running, `503` with
/// `"closing"` once shutdown has begun.
pub fn readiness(ctx: &mut Context) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        let running = ctx.dispatcher().is_some_and(|d| d.status() == Lifecycle::Running);
        ctx.set_content_type(ContentType::Text);
        if running {
            ctx.write(b"ready");
        } else {
            ctx.set_status(http::StatusCode::SERVICE_UNAVAILABLE);
            ctx.write(b"closing");
        }
        Ok(())
    })
}
