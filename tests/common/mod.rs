#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};

use razor::action::{
    ActionDescriptor, ActionError, ActionResult, ControllerDescriptor, ParamSource,
};
use razor::app::AppBuilder;
use razor::dispatcher::HeaderVec;
use razor::ioc::{Component, Constructor};
use serde::Deserialize;

pub mod test_server {
    use std::sync::Once;

    /// Ensures May coroutines are configured only once
    static MAY_INIT: Once = Once::new();

    pub fn setup_may_runtime() {
        MAY_INIT.call_once(|| {
            may::config().set_workers(2).set_stack_size(0x80000);
        });
    }
}

static TRACING_INIT: Once = Once::new();

/// Route test logs through the test writer; `RUST_LOG` controls the level.
pub fn init_test_tracing() {
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub trait BookStore: Send + Sync {
    fn title(&self, id: i64) -> Option<String>;
    fn titles(&self) -> Vec<String>;
}

pub struct InMemoryBooks {
    titles: Vec<String>,
}

impl Default for InMemoryBooks {
    fn default() -> Self {
        Self {
            titles: vec![
                "Dune".to_string(),
                "Solaris".to_string(),
                "Neuromancer".to_string(),
            ],
        }
    }
}

impl BookStore for InMemoryBooks {
    fn title(&self, id: i64) -> Option<String> {
        usize::try_from(id)
            .ok()
            .and_then(|i| self.titles.get(i))
            .cloned()
    }

    fn titles(&self) -> Vec<String> {
        self.titles.clone()
    }
}

/// Counts controller constructions, to observe per-request lifecycles.
pub static CONTROLLERS_BUILT: AtomicUsize = AtomicUsize::new(0);

pub struct BookController {
    store: Arc<dyn BookStore>,
}

impl BookController {
    pub fn new(store: Arc<dyn BookStore>) -> Self {
        CONTROLLERS_BUILT.fetch_add(1, Ordering::SeqCst);
        Self { store }
    }
}

#[derive(Deserialize)]
pub struct NewBook {
    pub title: String,
}

#[derive(Default)]
pub struct GenericController;

pub fn books_service() -> Component<InMemoryBooks> {
    Component::<InMemoryBooks>::with_default()
        .singleton()
        .implements::<dyn BookStore, _>(|b| b as Arc<dyn BookStore>)
}

pub fn book_controller() -> ControllerDescriptor {
    let component = Component::<BookController>::new()
        .constructor(Constructor::with1(|store: Arc<dyn BookStore>| BookController::new(store)));

    ControllerDescriptor::new("shop", component)
        .action(
            ActionDescriptor::get("book_detail", "books/{int:id}.html")
                .param(ParamSource::Route)
                .handler(|c: &BookController, ctx| {
                    let id = ctx.int(0)?;
                    let title = c
                        .store
                        .title(id)
                        .ok_or_else(|| ActionError::failed(format!("no book {id}")))?;
                    ActionResult::json(&serde_json::json!({ "id": id, "title": title }))
                }),
        )
        .action(
            ActionDescriptor::get("book_list", "books/list")
                .handler(|c: &BookController, _| ActionResult::json(&c.store.titles())),
        )
        .action(
            ActionDescriptor::post("create_book", "books")
                .param(ParamSource::Body)
                .handler(|_: &BookController, ctx| {
                    let book: NewBook = ctx.body(0)?;
                    ActionResult::json(&serde_json::json!({ "created": book.title }))
                }),
        )
        .action(
            ActionDescriptor::get("search", "search")
                .param(ParamSource::query("q"))
                .param(ParamSource::query_int("page"))
                .param(ParamSource::query_list("tag"))
                .handler(|_: &BookController, ctx| {
                    let args = ctx.args();
                    ActionResult::json(&serde_json::json!({
                        "q": args.str(0)?,
                        "page": args.int(1)?,
                        "tags": args.list(2)?,
                    }))
                }),
        )
        .action(
            ActionDescriptor::get("raw", "raw")
                .handler(|_: &BookController, ctx| {
                    let mut headers = HeaderVec::new();
                    headers.push((Arc::from("content-type"), "text/csv".to_string()));
                    ctx.response().write(201, headers, b"a,b".to_vec());
                    Ok(ActionResult::Empty)
                }),
        )
        .action(
            ActionDescriptor::get("boom", "boom")
                .handler(|_: &BookController, _| -> Result<ActionResult, ActionError> {
                    panic!("boom")
                }),
        )
        .action(
            ActionDescriptor::delete("remove_book", "books/{int:id}")
                .param(ParamSource::Route)
                .handler(|_: &BookController, _| Ok(ActionResult::Empty)),
        )
}

pub fn generic_controller() -> ControllerDescriptor {
    ControllerDescriptor::new("generic", Component::<GenericController>::with_default()).action(
        ActionDescriptor::all("anything", "*")
            .handler(|_: &GenericController, ctx| {
                Ok(ActionResult::text(format!("generic {}", ctx.request().path)))
            }),
    )
}

/// The shop application: a book store service, the book controller and a
/// catch-all generic controller.
pub fn shop_app() -> AppBuilder {
    init_test_tracing();
    AppBuilder::new()
        .service(books_service())
        .controller(book_controller())
        .controller(generic_controller())
}
