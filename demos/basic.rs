//! Minimal catena example: a couple of user endpoints, a timing middleware,
//! signed session cookies and health checks.
//!
//! Run with:
//!   cargo run --example basic
//!
//! Try:
//!   curl -i http://localhost:3000/users/42
//!   curl -i http://localhost:3000/users/abc        # 400, rejected by the validator
//!   curl -i -c jar -X POST http://localhost:3000/login
//!   curl -i -b jar http://localhost:3000/me
//!   curl -i -H 'x-forwarded-for: 10.0.0.5, 8.8.8.8' http://localhost:3000/ip
//!   curl http://localhost:3000/healthz

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use catena::{
    App, AtomicSignedKeys, BoxFuture, ContentType, Context, Cookie, Error, Handler, HandlerResult,
    Server, health,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let keys = Arc::new(AtomicSignedKeys::new(vec!["change-me".to_owned()]));
    let next_id = AtomicU64::new(1);

    let app = App::new()
        .generate_id(move || format!("{:08x}", next_id.fetch_add(1, Ordering::Relaxed)))
        .enable_trace(true)
        .on_trace(|ctx, traces| ctx.server_timing(traces, "catena-"))
        .on_error(|ctx, err| warn!(id = ctx.id(), route = ctx.route(), "request failed: {err}"))
        .signed_keys(keys)
        .validator("id", |value| match value.parse::<u64>() {
            Ok(_) => Ok(()),
            Err(_) => Err(Error::invalid_param("id", "must be a number")),
        })
        .use_handler(Handler::new(access_log))
        .get("/users/:id", [Handler::new(get_user)])
        .post("/login", [Handler::new(login)])
        .get("/me", [Handler::new(me)])
        .get("/ip", [Handler::new(client_ip)])
        .get("/healthz", [Handler::new(health::liveness)])
        .get("/readyz", [Handler::new(health::readiness)]);

    Server::bind("0.0.0.0:3000")
        .serve(app)
        .await
        .expect("server error");
}

fn access_log(ctx: &mut Context) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        let result = ctx.next().await;
        info!(id = ctx.id(), method = %ctx.method(), path = ctx.path(), status = ?ctx.status(), "request");
        result
    })
}

// GET /users/:id
fn get_user(ctx: &mut Context) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        let id = ctx.param("id").unwrap_or_default().to_owned();
        ctx.set_content_type(ContentType::Json);
        ctx.write(format!(r#"{{"id":{id},"name":"alice"}}"#).as_bytes());
        Ok(())
    })
}

// POST /login
fn login(ctx: &mut Context) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        ctx.add_signed_cookie(&Cookie::new("session", "alice").path("/").http_only(true))?;
        ctx.no_content();
        Ok::<(), Error>(())
    })
}

// GET /me
fn me(ctx: &mut Context) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        let Some(session) = ctx.signed_cookie("session")? else {
            return Err(Error::http(http::StatusCode::UNAUTHORIZED, "not logged in"));
        };
        ctx.set_content_type(ContentType::Text);
        ctx.write(session.value().as_bytes());
        Ok::<(), Error>(())
    })
}

// GET /ip
fn client_ip(ctx: &mut Context) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        let ip = ctx.client_ip().to_owned();
        ctx.no_cache();
        ctx.write(ip.as_bytes());
        Ok(())
    })
}
