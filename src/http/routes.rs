use crate::app::AppContext;
use axum::Router;

/// A group of routes mounted into the [`App`](crate::App).
///
/// Handlers take `State<AppContext>`; the state is supplied once the whole
/// router is assembled, so `routes` returns a router still missing it.
pub trait RouteModule {
    fn routes(&self) -> Router<AppContext>
    where
        Self: Sized;

    /// Mount every route under this prefix
    fn prefix(&self) -> Option<&str> {
        None
    }

    /// Merge (or nest, when a prefix is set) this module into `router`
    fn register(self, router: Router<AppContext>) -> Router<AppContext>
    where
        Self: Sized,
    {
        let routes = self.routes();

        if let Some(prefix) = self.prefix() {
            router.nest(prefix, routes)
        } else {
            router.merge(routes)
        }
    }
}
