//! Route access decisions.

use std::fmt;

use super::{SessionHandle, SessionSnapshot};

/// The views of the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Login,
    Dashboard,
    Inventory,
    Customers,
    StockIntake,
    Sales,
    Expenses,
    Reports,
    Catalog,
    Timeline,
}

impl Route {
    pub const ALL: [Route; 10] = [
        Route::Login,
        Route::Dashboard,
        Route::Inventory,
        Route::Customers,
        Route::StockIntake,
        Route::Sales,
        Route::Expenses,
        Route::Reports,
        Route::Catalog,
        Route::Timeline,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            Route::Login => "/login",
            Route::Dashboard => "/",
            Route::Inventory => "/inventory",
            Route::Customers => "/customers",
            Route::StockIntake => "/stock-intake",
            Route::Sales => "/sales",
            Route::Expenses => "/expenses",
            Route::Reports => "/reports",
            Route::Catalog => "/catalog",
            Route::Timeline => "/timeline",
        }
    }

    /// Parse a path. Trailing slashes are ignored.
    pub fn from_path(path: &str) -> Option<Route> {
        let trimmed = path.trim_end_matches('/');
        let path = if trimmed.is_empty() { "/" } else { trimmed };
        Route::ALL.into_iter().find(|r| r.path() == path)
    }

    pub fn title(&self) -> &'static str {
        match self {
            Route::Login => "Login",
            Route::Dashboard => "Dashboard",
            Route::Inventory => "Inventory",
            Route::Customers => "Customers",
            Route::StockIntake => "Stock Intake",
            Route::Sales => "Sales",
            Route::Expenses => "Expenses",
            Route::Reports => "Reports",
            Route::Catalog => "Catalog",
            Route::Timeline => "Timeline",
        }
    }

    pub fn requires_financial_access(&self) -> bool {
        matches!(self, Route::Expenses | Route::Reports)
    }

    /// Only reachable while logged out.
    pub fn is_anonymous_only(&self) -> bool {
        matches!(self, Route::Login)
    }

    /// Entries for the navigation menu, in display order.
    pub fn navigation(has_financial_access: bool) -> Vec<Route> {
        let mut routes = vec![
            Route::Dashboard,
            Route::Inventory,
            Route::Customers,
            Route::StockIntake,
            Route::Sales,
        ];
        if has_financial_access {
            routes.push(Route::Expenses);
            routes.push(Route::Reports);
        }
        routes
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// What to do with a navigation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Render(Route),
    /// Show the login view; return to `from` after a successful login.
    RedirectToLogin { from: Route },
    Redirect(Route),
}

impl RouteDecision {
    /// The route that ends up on screen.
    pub fn target(&self) -> Route {
        match self {
            RouteDecision::Render(route) | RouteDecision::Redirect(route) => *route,
            RouteDecision::RedirectToLogin { .. } => Route::Login,
        }
    }
}

/// Decides whether a requested view is reachable for the current session.
#[derive(Clone)]
pub struct RouteGuard {
    session: SessionHandle,
}

impl RouteGuard {
    pub fn new(session: SessionHandle) -> Self {
        Self { session }
    }

    pub fn decide(&self, route: Route) -> RouteDecision {
        Self::evaluate(route, &self.session.snapshot())
    }

    pub fn evaluate(route: Route, snapshot: &SessionSnapshot) -> RouteDecision {
        if !snapshot.is_authenticated() {
            return if route.is_anonymous_only() {
                RouteDecision::Render(route)
            } else {
                RouteDecision::RedirectToLogin { from: route }
            };
        }

        if route.is_anonymous_only() {
            return RouteDecision::Redirect(Route::Dashboard);
        }
        if route.requires_financial_access() && !snapshot.has_financial_access() {
            return RouteDecision::Redirect(Route::Dashboard);
        }
        RouteDecision::Render(route)
    }
}
