//! A small task-list service wired through the interceptor chain:
//! logger, parameter and cookie decoding, routed handlers over an injected
//! in-memory store, and a trailing catch-all for everything unmatched.
//!
//! Run with `cargo run --example basic`, then try:
//!
//! ```text
//! curl http://127.0.0.1:8080/tasks
//! curl -X POST -d 'title=write+docs' http://127.0.0.1:8080/tasks
//! curl http://127.0.0.1:8080/tasks/1
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::Mutex;

use lamina::aspect::{self, Logger};
use lamina::{Context, Next, Router, Server, StatusCode, from_aspect};

/// The injected "persistent store" collaborator.
#[derive(Default)]
struct Store {
    tasks: Mutex<HashMap<u64, String>>,
    next_id: Mutex<u64>,
}

type SharedStore = Arc<Store>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let store: SharedStore = Arc::new(Store::default());
    let router = Router::new();

    let mut server = Server::bind("127.0.0.1:8080").await?;
    println!("Listening on http://{}", server.local_addr());

    // Constructed at startup, injected into every traversal.
    server.context_init(move |ctx| {
        ctx.extensions_mut().insert(Arc::clone(&store));
    });

    server
        .register(from_aspect(Arc::new(Logger)))
        .register(aspect::params())
        .register(aspect::cookies());

    server.register(router.get("/tasks", |mut ctx: Context, _next: Next| async move {
        let store = Arc::clone(ctx.extensions().get::<SharedStore>().expect("store injected"));
        let tasks = store.tasks.lock().await;
        let data: Vec<_> = tasks
            .iter()
            .map(|(id, title)| json!({"id": id, "title": title}))
            .collect();
        ctx.response_mut().set_header("Content-Type", "application/json");
        ctx.response_mut().set_body(json!({ "data": data }));
        Ok(ctx)
    })?);

    server.register(router.post("/tasks", |mut ctx: Context, _next: Next| async move {
        let Some(title) = ctx.params().get("title").map(str::to_owned) else {
            ctx.response_mut().set_status(StatusCode::UnprocessableEntity);
            ctx.response_mut().set_body(json!({"err": "missing title"}));
            return Ok(ctx);
        };
        let store = Arc::clone(ctx.extensions().get::<SharedStore>().expect("store injected"));
        let id = {
            let mut next_id = store.next_id.lock().await;
            *next_id += 1;
            *next_id
        };
        store.tasks.lock().await.insert(id, title);
        ctx.response_mut().set_status(StatusCode::Created);
        ctx.response_mut().set_body(json!({ "id": id }));
        Ok(ctx)
    })?);

    server.register(router.get("/tasks/:id", |mut ctx: Context, _next: Next| async move {
        let id: u64 = match ctx.route().and_then(|r| r.get("id")).and_then(|v| v.parse().ok()) {
            Some(id) => id,
            None => {
                ctx.response_mut().set_status(StatusCode::UnprocessableEntity);
                ctx.response_mut().set_body(json!({"err": "bad id"}));
                return Ok(ctx);
            }
        };
        let store = Arc::clone(ctx.extensions().get::<SharedStore>().expect("store injected"));
        let title = store.tasks.lock().await.get(&id).cloned();
        match title {
            Some(title) => {
                ctx.response_mut().set_body(json!({"id": id, "title": title}));
            }
            None => {
                ctx.response_mut().set_status(StatusCode::NotFound);
                ctx.response_mut().set_body(json!({"err": "no such task"}));
            }
        }
        Ok(ctx)
    })?);

    // Catch-all: anything unclaimed is a 404. Registered last on purpose.
    server.register(router.all(".*", |mut ctx: Context, _next: Next| async move {
        ctx.response_mut().set_status(StatusCode::NotFound);
        ctx.response_mut().set_body("Not Found");
        Ok(ctx)
    })?);

    server.run().await?;
    Ok(())
}
