//! End-to-end dispatch scenarios, driven in-process without sockets.
//!
//! Each test builds an [`App`], dispatches `http::Request`s with in-memory
//! bodies and inspects the finished `http::Response`.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context as TaskContext, Poll};
use std::time::{Duration, Instant};

use bytes::Bytes;
use catena::{
    compose, App, AtomicSignedKeys, Body, BoxFuture, Context, Cookie, Dispatcher, Error, Group,
    Handler, HandlerResult, HttpError, Lifecycle, RotateKeys, SERVER_TIMING, SKIP_TRACE, TraceInfos,
    health,
};
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Request, StatusCode};
use http_body_util::{BodyExt, Full};
use parking_lot::Mutex;
use proptest::prelude::*;
use tokio::io::{AsyncRead, ReadBuf};

type Log = Arc<Mutex<Vec<String>>>;

fn get(uri: &str) -> Request<Full<Bytes>> {
    Request::get(uri).body(Full::new(Bytes::new())).unwrap()
}

async fn send(dispatcher: &Dispatcher, req: Request<Full<Bytes>>) -> (StatusCode, HeaderMap, String) {
    let response = dispatcher.dispatch(req, None).await;
    let (parts, body) = response.into_parts();
    let bytes = body.collect().await.unwrap().to_bytes();
    (parts.status, parts.headers, String::from_utf8(bytes.to_vec()).unwrap())
}

/// Logs `name` on the way in and `/name` on the way out.
fn around(log: &Log, name: &'static str) -> Handler {
    let log = Arc::clone(log);
    Handler::named(name, move |ctx| {
        let log = Arc::clone(&log);
        Box::pin(async move {
            log.lock().push(name.to_owned());
            let result = ctx.next().await;
            log.lock().push(format!("/{name}"));
            result
        })
    })
}

/// Logs `name` and writes it as the body without continuing.
fn terminal(log: &Log, name: &'static str) -> Handler {
    let log = Arc::clone(log);
    Handler::named(name, move |ctx| {
        let log = Arc::clone(&log);
        Box::pin(async move {
            log.lock().push(name.to_owned());
            ctx.write(name.as_bytes());
            Ok(())
        })
    })
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().clone()
}

// ── Chain ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn globals_run_before_route_handlers() {
    let log = Log::default();
    let dispatcher = App::new()
        .use_handlers([around(&log, "a"), around(&log, "b")])
        .get("/", [terminal(&log, "c")])
        .build();

    let (status, headers, body) = send(&dispatcher, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "c");
    assert_eq!(headers[header::CONTENT_LENGTH], "1");
    assert_eq!(entries(&log), ["a", "b", "c", "/b", "/a"]);
}

fn commit_early(ctx: &mut Context) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        let response = ctx.response_mut();
        response.write_head(StatusCode::ACCEPTED);
        response.write(b"from b");
        ctx.commit();
        ctx.next().await
    })
}

#[tokio::test]
async fn committing_skips_the_rest_of_the_chain() {
    let log = Log::default();
    let dispatcher = App::new()
        .use_handlers([around(&log, "a"), Handler::named("b", commit_early)])
        .get("/", [terminal(&log, "c")])
        .build();

    let (status, _, body) = send(&dispatcher, get("/")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body, "from b");
    assert_eq!(entries(&log), ["a", "/a"]);
}

fn greedy(calls: usize, ran: Arc<AtomicUsize>) -> Handler {
    Handler::named("greedy", move |ctx| {
        let ran = Arc::clone(&ran);
        Box::pin(async move {
            ran.fetch_add(1, Ordering::SeqCst);
            for _ in 0..calls {
                ctx.next().await?;
            }
            Ok::<(), Error>(())
        })
    })
}

proptest! {
    #[test]
    fn extra_next_calls_are_noops(calls in 1usize..6, globals in 0usize..4) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let ran = Arc::new(AtomicUsize::new(0));
        let finals = Arc::new(AtomicUsize::new(0));

        let counted = Arc::clone(&finals);
        let last = Handler::named("last", move |ctx| {
            let counted = Arc::clone(&counted);
            Box::pin(async move {
                counted.fetch_add(1, Ordering::SeqCst);
                ctx.write(b"done");
                ctx.next().await
            })
        });
        let dispatcher = App::new()
            .use_handlers((0..globals).map(|_| greedy(calls, Arc::clone(&ran))))
            .get("/", [last])
            .build();

        let (status, _, body) = runtime.block_on(send(&dispatcher, get("/")));
        prop_assert_eq!(status, StatusCode::OK);
        prop_assert_eq!(body, "done");
        prop_assert_eq!(ran.load(Ordering::SeqCst), globals);
        prop_assert_eq!(finals.load(Ordering::SeqCst), 1);
    }
}

#[tokio::test]
async fn compose_returns_to_the_outer_chain() {
    let log = Log::default();
    let dispatcher = App::new()
        .use_handler(around(&log, "a"))
        .get("/", [compose([around(&log, "x"), around(&log, "y")]), terminal(&log, "z")])
        .build();

    let (_, _, body) = send(&dispatcher, get("/")).await;
    assert_eq!(body, "z");
    assert_eq!(entries(&log), ["a", "x", "y", "z", "/y", "/x", "/a"]);
}

#[tokio::test]
async fn compose_as_the_last_handler_ends_cleanly() {
    let log = Log::default();
    let dispatcher = App::new()
        .get("/", [compose([around(&log, "x"), terminal(&log, "y")])])
        .build();

    let (status, _, body) = send(&dispatcher, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "y");
    assert_eq!(entries(&log), ["x", "y", "/x"]);
}

// ── Validation ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn validators_guard_the_final_handler() {
    let log = Log::default();
    let dispatcher = App::new()
        .validator("id", |value| {
            if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
                Ok(())
            } else {
                Err(Error::invalid_param("id", "digits only"))
            }
        })
        .use_handler(around(&log, "mw"))
        .get("/users/:id", [terminal(&log, "user")])
        .build();

    let (status, _, body) = send(&dispatcher, get("/users/42")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "user");

    log.lock().clear();
    let (status, _, body) = send(&dispatcher, get("/users/ab")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "invalid param `id`: digits only");
    assert_eq!(entries(&log), ["mw", "/mw"]);
}

// ── Finalizer ─────────────────────────────────────────────────────────────────

fn forbidden(ctx: &mut Context) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        ctx.set_header(header::ETAG, "\"v1\"")?;
        ctx.set_header(header::LAST_MODIFIED, "Wed, 21 Oct 2015 07:28:00 GMT")?;
        ctx.set_header(header::CONTENT_ENCODING, "gzip")?;
        ctx.set_header(header::CACHE_CONTROL, "no-cache")?;
        ctx.write(b"partial");
        Err::<(), Error>(HttpError::new(StatusCode::FORBIDDEN, "nope").with_category("auth").into())
    })
}

#[tokio::test]
async fn errors_clear_cache_validators_and_reach_listeners() {
    let seen = Log::default();
    let listener_log = Arc::clone(&seen);
    let dispatcher = App::new()
        .on_error(move |_, err| listener_log.lock().push(err.to_string()))
        .get("/", [Handler::new(forbidden)])
        .build();

    let (status, headers, body) = send(&dispatcher, get("/")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, "category=auth, message=nope");
    assert!(headers.get(header::ETAG).is_none());
    assert!(headers.get(header::LAST_MODIFIED).is_none());
    assert!(headers.get(header::CONTENT_ENCODING).is_none());
    assert_eq!(headers[header::CACHE_CONTROL], "no-cache");
    assert_eq!(headers[header::CONTENT_TYPE], "text/plain; charset=utf-8");
    assert_eq!(entries(&seen), ["category=auth, message=nope"]);
}

fn boom(_: &mut Context) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move { Err::<(), Error>(Error::other("boom")) })
}

#[tokio::test]
async fn custom_error_mapper_fills_the_context() {
    let dispatcher = App::new()
        .error_handler(|ctx, err| {
            ctx.set_status(StatusCode::IM_A_TEAPOT);
            ctx.write(format!("mapped: {err}").as_bytes());
        })
        .get("/", [Handler::new(boom)])
        .build();

    let (status, _, body) = send(&dispatcher, get("/")).await;
    assert_eq!(status, StatusCode::IM_A_TEAPOT);
    assert_eq!(body, "mapped: boom");
}

#[tokio::test]
async fn error_mapper_without_status_answers_500() {
    let dispatcher = App::new()
        .error_handler(|ctx, _| ctx.write(b"oops"))
        .get("/", [Handler::new(boom)])
        .build();

    let (status, _, body) = send(&dispatcher, get("/")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "oops");
}

fn commit_then_fail(ctx: &mut Context) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        ctx.response_mut().write_head(StatusCode::OK);
        ctx.response_mut().write(b"already sent");
        ctx.commit();
        Err::<(), Error>(Error::other("late failure"))
    })
}

#[tokio::test]
async fn listeners_see_errors_on_committed_responses() {
    let count = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&count);
    let dispatcher = App::new()
        .on_error(move |_, _| {
            counted.fetch_add(1, Ordering::SeqCst);
        })
        .get("/", [Handler::new(commit_then_fail)])
        .build();

    let (status, _, body) = send(&dispatcher, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "already sent");
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

fn status_only(ctx: &mut Context) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        ctx.no_content();
        Ok(())
    })
}

#[tokio::test]
async fn status_without_body_is_written_bare() {
    let dispatcher = App::new().delete("/users/:id", [Handler::new(status_only)]).build();
    let (status, headers, body) = send(&dispatcher, Request::delete("/users/1").body(Full::new(Bytes::new())).unwrap()).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(headers.get(header::CONTENT_LENGTH).is_none());
    assert!(body.is_empty());
}

struct Broken;

impl AsyncRead for Broken {
    fn poll_read(self: Pin<&mut Self>, _: &mut TaskContext<'_>, _: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::other("disk gone")))
    }
}

fn broken_download(ctx: &mut Context) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        ctx.set_body(Body::reader(Broken));
        Ok(())
    })
}

fn download(ctx: &mut Context) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        ctx.set_status(StatusCode::PARTIAL_CONTENT);
        ctx.set_body(Body::reader(&b"0123456789"[..]));
        Ok(())
    })
}

#[tokio::test]
async fn readers_are_streamed() {
    let dispatcher = App::new().get("/file", [Handler::new(download)]).build();
    let (status, _, body) = send(&dispatcher, get("/file")).await;
    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(body, "0123456789");
}

#[tokio::test]
async fn stream_failures_reach_listeners() {
    let seen = Log::default();
    let listener_log = Arc::clone(&seen);
    let dispatcher = App::new()
        .generate_id(|| "req-1".to_owned())
        .on_error(move |ctx, err| listener_log.lock().push(format!("{} {err}", ctx.id())))
        .get("/file", [Handler::new(broken_download)])
        .build();

    let response = dispatcher.dispatch(get("/file"), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.into_body().collect().await.is_err());
    assert_eq!(entries(&seen), ["req-1 io: disk gone"]);
}

// ── Terminal paths ────────────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_routes_get_404() {
    let log = Log::default();
    let dispatcher = App::new().get("/users", [terminal(&log, "users")]).build();

    let (status, _, body) = send(&dispatcher, get("/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "Not found");

    let post = Request::post("/users").body(Full::new(Bytes::new())).unwrap();
    assert_eq!(send(&dispatcher, post).await.0, StatusCode::NOT_FOUND);
    assert!(entries(&log).is_empty());
}

#[tokio::test]
async fn custom_not_found_handler() {
    let dispatcher = App::new()
        .not_found_handler(|parts| {
            let mut response = http::Response::new(catena::ResponseBody::full(format!("no {}", parts.uri.path())));
            *response.status_mut() = StatusCode::NOT_FOUND;
            response
        })
        .build();

    let (status, _, body) = send(&dispatcher, get("/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "no /missing");
}

#[tokio::test]
async fn closed_dispatcher_answers_503() {
    let log = Log::default();
    let dispatcher = App::new()
        .get("/readyz", [Handler::new(health::readiness)])
        .get("/", [terminal(&log, "root")])
        .build();

    let (status, _, body) = send(&dispatcher, get("/readyz")).await;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "ready"));

    dispatcher.close();
    assert_eq!(dispatcher.status(), Lifecycle::Closed);
    let (status, _, body) = send(&dispatcher, get("/")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, "service is not available, status is 2");
    assert!(entries(&log).is_empty());
}

// ── Registration ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn groups_prefix_paths_and_prepend_handlers() {
    let log = Log::default();
    let api = Group::new("/api", [around(&log, "group")])
        .get("/users", [terminal(&log, "list")])
        .post("/users", [terminal(&log, "create")]);
    let dispatcher = App::new().use_handler(around(&log, "global")).group(api).build();

    let (_, _, body) = send(&dispatcher, get("/api/users")).await;
    assert_eq!(body, "list");
    assert_eq!(entries(&log), ["global", "group", "list", "/group", "/global"]);

    let routes: Vec<String> = dispatcher.routers().iter().map(|r| format!("{} {}", r.method, r.path)).collect();
    assert_eq!(routes, ["GET /api/users", "POST /api/users"]);
}

fn echo_route(ctx: &mut Context) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        let text = format!("{} {} {}", ctx.id(), ctx.route(), ctx.path());
        ctx.write(text.as_bytes());
        Ok(())
    })
}

#[tokio::test]
async fn pre_hooks_rewrite_before_lookup() {
    let counter = Arc::new(AtomicUsize::new(0));
    let dispatcher = App::new()
        .pre(|parts| {
            if let Some(rest) = parts.uri.path().strip_prefix("/v1") {
                if let Ok(uri) = rest.parse() {
                    parts.uri = uri;
                }
            }
        })
        .generate_id(move || format!("id-{}", counter.fetch_add(1, Ordering::SeqCst)))
        .get("/users/:id", [Handler::new(echo_route)])
        .build();

    let (_, _, body) = send(&dispatcher, get("/v1/users/7")).await;
    assert_eq!(body, "id-0 /users/:id /users/7");
    let (_, _, body) = send(&dispatcher, get("/users/8")).await;
    assert_eq!(body, "id-1 /users/:id /users/8");
}

fn echo_body(ctx: &mut Context) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        let name = ctx.query_param("name").unwrap_or("anonymous").to_owned();
        let body = ctx.read_body().await?.clone();
        ctx.created(Body::value(()));
        ctx.write(name.as_bytes());
        ctx.write(b":");
        ctx.write(&body);
        Ok::<(), Error>(())
    })
}

#[tokio::test]
async fn request_body_and_query_are_readable() {
    let dispatcher = App::new().post("/echo", [Handler::new(echo_body)]).build();
    let req = Request::post("/echo?name=tree&name=other").body(Full::new(Bytes::from_static(b"payload"))).unwrap();
    let (status, _, body) = send(&dispatcher, req).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, "tree:payload");
}

// ── Tracing ───────────────────────────────────────────────────────────────────

fn pass(ctx: &mut Context) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move { ctx.next().await })
}

fn slow(ctx: &mut Context) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        ctx.write(b"ok");
        Ok(())
    })
}

#[tokio::test]
async fn traces_feed_listeners_and_server_timing() {
    let names = Log::default();
    let seen = Arc::clone(&names);
    let dispatcher = App::new()
        .enable_trace(true)
        .on_trace(move |ctx, traces| {
            seen.lock().extend(traces.iter().map(|t| t.name.to_string()));
            ctx.server_timing(traces, "t-");
        })
        .use_handlers([Handler::named("a", pass), Handler::named(SKIP_TRACE, pass)])
        .get("/", [Handler::named("b", slow)])
        .build();

    let (status, headers, _) = send(&dispatcher, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(entries(&names), ["a", "b"]);

    let timing = headers[&SERVER_TIMING].to_str().unwrap();
    let tokens: Vec<&str> = timing.split(',').collect();
    assert_eq!(tokens.len(), 2);
    assert!(tokens[0].starts_with("t-0;dur=") && tokens[0].ends_with(r#"desc="a""#), "{timing}");
    assert!(tokens[1].starts_with("t-1;dur=") && tokens[1].ends_with(r#"desc="b""#), "{timing}");
}

#[tokio::test]
async fn tracing_off_calls_no_listener() {
    let count = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&count);
    let dispatcher = App::new()
        .on_trace(move |_, _| {
            counted.fetch_add(1, Ordering::SeqCst);
        })
        .get("/", [Handler::named("b", slow)])
        .build();

    send(&dispatcher, get("/")).await;
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

// ── Cookies and addresses ─────────────────────────────────────────────────────

fn login(ctx: &mut Context) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        ctx.add_signed_cookie(&Cookie::new("session", "tree").path("/").http_only(true))?;
        Ok::<(), Error>(())
    })
}

fn whoami(ctx: &mut Context) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        match ctx.signed_cookie("session")? {
            Some(cookie) => ctx.write(cookie.value().as_bytes()),
            None => ctx.set_status(StatusCode::UNAUTHORIZED),
        }
        Ok::<(), Error>(())
    })
}

#[tokio::test]
async fn signed_cookies_survive_until_keys_rotate() {
    let keys = Arc::new(AtomicSignedKeys::new(vec!["k1".to_owned()]));
    let dispatcher = App::new()
        .signed_keys(keys.clone())
        .post("/login", [Handler::new(login)])
        .get("/me", [Handler::new(whoami)])
        .build();

    let (_, headers, _) = send(&dispatcher, Request::post("/login").body(Full::new(Bytes::new())).unwrap()).await;
    let jar: Vec<&str> = headers
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().split(';').next().unwrap())
        .collect();
    assert_eq!(jar.len(), 2);
    assert!(jar[1].starts_with("session.sig="));
    let cookie_header = HeaderValue::from_str(&jar.join("; ")).unwrap();

    let me = || {
        let mut req = get("/me");
        req.headers_mut().insert(header::COOKIE, cookie_header.clone());
        req
    };

    let (status, _, body) = send(&dispatcher, me()).await;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "tree"));

    keys.set_keys(vec!["k2".to_owned(), "k1".to_owned()]);
    let (status, _, body) = send(&dispatcher, me()).await;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "tree"));

    keys.set_keys(vec!["k3".to_owned()]);
    let (status, _, _) = send(&dispatcher, me()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

fn addresses(ctx: &mut Context) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        let real = ctx.real_ip().to_owned();
        let client = ctx.client_ip().to_owned();
        ctx.write(format!("{real} {client}").as_bytes());
        Ok(())
    })
}

#[tokio::test]
async fn client_ip_skips_private_hops() {
    let dispatcher = App::new().get("/ip", [Handler::new(addresses)]).build();
    let peer = Some("192.168.1.20:4000".parse().unwrap());

    let ask = |forwarded: &'static str| {
        let mut req = get("/ip");
        req.headers_mut().insert("x-forwarded-for", HeaderValue::from_static(forwarded));
        req
    };

    let response = dispatcher.dispatch(ask("10.0.0.5, 8.8.8.8"), peer).await;
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"10.0.0.5 8.8.8.8");

    let response = dispatcher.dispatch(ask("10.0.0.5"), peer).await;
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"10.0.0.5 192.168.1.20");
}

// ── Hand-off ──────────────────────────────────────────────────────────────────

fn upstream_echo(ctx: &mut Context) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        let body = ctx.read_body().await?.clone();
        ctx.set_header(HeaderName::from_static("x-served-by"), "upstream")?;
        ctx.set_status(StatusCode::ACCEPTED);
        ctx.write(&body);
        Ok::<(), Error>(())
    })
}

fn hand_off(to: Dispatcher, read_first: bool) -> Handler {
    Handler::named("hand-off", move |ctx| {
        let to = to.clone();
        Box::pin(async move {
            if read_first {
                ctx.read_body().await?;
            }
            ctx.set_header(HeaderName::from_static("x-dropped"), "yes")?;
            ctx.pass(&to).await
        })
    })
}

#[tokio::test]
async fn pass_answers_with_the_other_dispatcher() {
    let upstream = App::new().post("/echo", [Handler::named("echo", upstream_echo)]).build();

    for read_first in [false, true] {
        let log = Log::default();
        let front = App::new()
            .use_handler(around(&log, "front"))
            .post("/echo", [hand_off(upstream.clone(), read_first)])
            .build();

        let req = Request::post("/echo").body(Full::new(Bytes::from_static(b"payload"))).unwrap();
        let (status, headers, body) = send(&front, req).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body, "payload");
        assert_eq!(headers["x-served-by"], "upstream");
        assert!(headers.get("x-dropped").is_none());
        assert_eq!(entries(&log), ["front", "/front"]);
    }
}

// ── Concurrency ───────────────────────────────────────────────────────────────

fn stamp(ctx: &mut Context) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        let id = ctx.id().to_owned();
        ctx.set_header(HeaderName::from_static("x-request-id"), &id)?;
        ctx.next().await
    })
}

/// Fails if anything from an earlier request is still visible, then
/// yields mid-request so other requests interleave.
fn own_state(ctx: &mut Context) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        if ctx.get::<String>("n").is_some() || ctx.body_buffer().is_some() || ctx.status().is_some() {
            return Err(Error::http(StatusCode::CONFLICT, "state leaked from another request"));
        }
        let n = ctx.param("n").unwrap_or_default().to_owned();
        ctx.set("n", n.clone());
        tokio::task::yield_now().await;
        let q = ctx.query_param("q").unwrap_or_default().to_owned();
        let body = format!("{n} {q} {}", ctx.get_string("n"));
        ctx.write(body.as_bytes());
        Ok::<(), Error>(())
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_keep_their_own_state() {
    let next_id = AtomicUsize::new(0);
    let dispatcher = App::new()
        .generate_id(move || format!("req-{}", next_id.fetch_add(1, Ordering::SeqCst)))
        .use_handler(Handler::named("stamp", stamp))
        .get("/items/:n", [Handler::named("own", own_state)])
        .build();

    let tasks: Vec<_> = (0..256)
        .map(|n| {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                let (status, headers, body) = send(&dispatcher, get(&format!("/items/{n}?q={n}"))).await;
                assert_eq!(status, StatusCode::OK, "{body}");
                assert_eq!(body, format!("{n} {n} {n}"));
                headers["x-request-id"].to_str().unwrap().to_owned()
            })
        })
        .collect();

    let mut ids = std::collections::HashSet::new();
    for task in tasks {
        assert!(ids.insert(task.await.unwrap()));
    }
    assert_eq!(ids.len(), 256);

    // Pooled contexts come back clean for sequential traffic too.
    for n in 0..8 {
        let (status, _, body) = send(&dispatcher, get(&format!("/items/{n}?q=x"))).await;
        assert_eq!((status, body), (StatusCode::OK, format!("{n} x {n}")));
    }
}

// ── Trace totals ──────────────────────────────────────────────────────────────

fn sleep_then_next(name: &'static str, ms: u64) -> Handler {
    Handler::named(name, move |ctx| {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            ctx.next().await
        })
    })
}

fn timed_outer(ctx: &mut Context) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        let started = Instant::now();
        tokio::time::sleep(Duration::from_millis(1)).await;
        let result = ctx.next().await;
        ctx.set("inner", started.elapsed());
        result
    })
}

#[tokio::test]
async fn self_times_add_up_to_the_first_handler() {
    let captured: Arc<Mutex<Option<(TraceInfos, Duration)>>> = Arc::default();
    let sink = Arc::clone(&captured);
    let dispatcher = App::new()
        .enable_trace(true)
        .on_trace(move |ctx, traces| {
            *sink.lock() = Some((traces.clone(), ctx.get_duration("inner")));
        })
        .use_handlers([Handler::named("outer", timed_outer), sleep_then_next("mid", 3)])
        .get("/", [sleep_then_next("last", 4)])
        .build();

    let started = Instant::now();
    let (status, _, _) = send(&dispatcher, get("/")).await;
    let wall = started.elapsed();
    assert_eq!(status, StatusCode::OK);

    let (traces, inner) = captured.lock().take().unwrap();
    let names: Vec<&str> = traces.iter().map(|t| &*t.name).collect();
    assert_eq!(names, ["outer", "mid", "last"]);

    // The first record's cumulative time wraps the handler's own measurement
    // and sits inside the whole dispatch.
    let total = traces.total();
    assert!(inner <= total && total <= wall, "{inner:?} <= {total:?} <= {wall:?}");
    assert!(traces[1].duration >= Duration::from_millis(3), "{traces:?}");
    assert!(traces[2].duration >= Duration::from_millis(4), "{traces:?}");
}
