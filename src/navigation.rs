use std::cell::Cell;
use std::rc::Rc;

/// Surfaces the client can show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Route {
    #[default]
    Login,
    Search,
}

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Self::Login => "/login",
            Self::Search => "/search",
        }
    }
}

pub trait Navigator {
    fn go_to(&mut self, route: Route);
}

/// Navigator for the REPL: remembers the current surface and announces moves.
/// Clones share the current route.
#[derive(Debug, Clone, Default)]
pub struct CliNavigator {
    current: Rc<Cell<Route>>,
}

impl CliNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Route {
        self.current.get()
    }
}

impl Navigator for CliNavigator {
    fn go_to(&mut self, route: Route) {
        let previous = self.current.replace(route);
        if previous != route {
            println!("→ {}", route.path());
        }
        tracing::debug!(from = previous.path(), to = route.path(), "navigate");
    }
}

#[cfg(test)]
pub use recording::RecordingNavigator;


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_paths() {
        assert_eq!(Route::Login.path(), "/login");
        assert_eq!(Route::Search.path(), "/search");
        assert_eq!(Route::default(), Route::Login);
    }

    #[test]
    fn test_cli_navigator_tracks_current() {
        let mut nav = CliNavigator::new();
        let view = nav.clone();
        assert_eq!(view.current(), Route::Login);
        nav.go_to(Route::Search);
        assert_eq!(view.current(), Route::Search);
        nav.go_to(Route::Login);
        assert_eq!(view.current(), Route::Login);
    }
}
