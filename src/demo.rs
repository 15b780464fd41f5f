//! Demo endpoints for exercising the recovery path.
//!
//! | Path | Behaviour |
//! |---|---|
//! | `/panic/` | panics before writing anything |
//! | `/panic-after/` | writes `<h1>Hello!</h1>`, then panics |
//! | `/` | writes `<h1>Hello!</h1>` and returns |

use crate::handler::BoxFuture;
use crate::request::Request;
use crate::router::Router;
use crate::writer::{ContentType, ResponseWriter};

pub const HELLO: &str = "<h1>Hello!</h1>";

/// The demo routing table.
pub fn router() -> Router {
    Router::new()
        .route("/panic/", panic_demo)
        .route("/panic-after/", panic_after_demo)
        .route("/", hello)
}

pub fn hello(_req: Request, w: &mut dyn ResponseWriter) -> BoxFuture<'_> {
    Box::pin(async move {
        w.set_content_type(ContentType::Html);
        let _ = w.write(HELLO.as_bytes());
    })
}

pub fn panic_demo(_req: Request, _w: &mut dyn ResponseWriter) -> BoxFuture<'_> {
    Box::pin(async move {
        func_that_panics();
    })
}

pub fn panic_after_demo(_req: Request, w: &mut dyn ResponseWriter) -> BoxFuture<'_> {
    Box::pin(async move {
        w.set_content_type(ContentType::Html);
        let _ = w.write(HELLO.as_bytes());
        func_that_panics();
    })
}

fn func_that_panics() {
    panic!("Oh no!");
}
