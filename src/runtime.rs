//! Fire-and-forget task execution for web and native builds.
//!
//! On the web everything runs on the browser's event loop, so futures need not be
//! `Send`. Natively each task gets its own thread and must be.

use std::future::Future;

#[cfg(target_arch = "wasm32")]
pub type BoxedFuture<T> = futures::future::LocalBoxFuture<'static, T>;
#[cfg(not(target_arch = "wasm32"))]
pub type BoxedFuture<T> = futures::future::BoxFuture<'static, T>;

/// `Send` where tasks cross threads (native), nothing on the web.
#[cfg(not(target_arch = "wasm32"))]
pub trait MaybeSend: Send {}
#[cfg(not(target_arch = "wasm32"))]
impl<T: Send> MaybeSend for T {}
#[cfg(target_arch = "wasm32")]
pub trait MaybeSend {}
#[cfg(target_arch = "wasm32")]
impl<T> MaybeSend for T {}

/// A spawned unit of work; results travel back through a channel.
pub type Task = BoxedFuture<()>;

/// Seam for running tasks, so tests can drive them on a local pool.
pub trait Spawn {
    fn spawn(&self, task: Task);
}

/// Runs tasks with [`execute`].
#[derive(Debug, Default, Clone, Copy)]
pub struct Executor;

impl Spawn for Executor {
    fn spawn(&self, task: Task) {
        execute(task);
    }
}

/// Box a future as a [`BoxedFuture`].
#[cfg(target_arch = "wasm32")]
pub fn boxed<T, F: Future<Output = T> + 'static>(f: F) -> BoxedFuture<T> {
    Box::pin(f)
}
#[cfg(not(target_arch = "wasm32"))]
pub fn boxed<T, F: Future<Output = T> + Send + 'static>(f: F) -> BoxedFuture<T> {
    Box::pin(f)
}

// Executes an async future without blocking the egui thread
#[cfg(not(target_arch = "wasm32"))]
pub fn execute<F: Future<Output = ()> + Send + 'static>(f: F) {
    std::thread::spawn(move || futures::executor::block_on(f));
}
#[cfg(target_arch = "wasm32")]
pub fn execute<F: Future<Output = ()> + 'static>(f: F) {
    wasm_bindgen_futures::spawn_local(f);
}
