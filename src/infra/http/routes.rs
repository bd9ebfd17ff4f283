//! Route registry.
//!
//! Handler modules describe their routes through a [`RouteRegistrar`]; the
//! registrar records layout metadata alongside each method router so the
//! classifier can resolve pages without consulting handlers.

use std::fmt;

use axum::{Router, middleware::from_fn_with_state, routing::MethodRouter};

use crate::{
    application::{classify::RouteLayout, layout::SharedLayout},
    config::ProtocolSettings,
    infra::assets,
};

use super::{
    AppState,
    handlers::{counter, error, home, items},
    middleware::{RouteGuard, guard_route},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    /// Navigable route rendered as a document.
    Page,
    /// Fragment-only route; navigating to it yields the error page.
    Fragment,
    /// Served as-is, outside the protocol.
    Raw,
}

impl fmt::Display for RouteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RouteKind::Page => "page",
            RouteKind::Fragment => "fragment",
            RouteKind::Raw => "raw",
        })
    }
}

/// Metadata describing one registered route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub path: String,
    pub kind: RouteKind,
    pub layout: Option<&'static str>,
    pub antiforgery: bool,
}

struct Pending {
    entry: RouteEntry,
    layout: RouteLayout,
    methods: MethodRouter<AppState>,
}

pub struct RouteRegistrar {
    error_route: String,
    pending: Vec<Pending>,
}

impl RouteRegistrar {
    pub fn new(protocol: &ProtocolSettings) -> Self {
        Self {
            error_route: protocol.error_route.clone(),
            pending: Vec::new(),
        }
    }

    /// Path the protocol sends failed fragment exchanges to.
    pub fn error_route(&self) -> &str {
        &self.error_route
    }

    /// Register a page wrapped in the process default layout.
    pub fn page(&mut self, path: impl Into<String>, methods: MethodRouter<AppState>) -> &mut Self {
        self.push(path.into(), RouteKind::Page, RouteLayout::Default, methods)
    }

    pub fn page_with(
        &mut self,
        path: impl Into<String>,
        layout: SharedLayout,
        methods: MethodRouter<AppState>,
    ) -> &mut Self {
        self.push(
            path.into(),
            RouteKind::Page,
            RouteLayout::Explicit(layout),
            methods,
        )
    }

    pub fn fragment(
        &mut self,
        path: impl Into<String>,
        methods: MethodRouter<AppState>,
    ) -> &mut Self {
        self.push(path.into(), RouteKind::Fragment, RouteLayout::None, methods)
    }

    pub fn raw(&mut self, path: impl Into<String>, methods: MethodRouter<AppState>) -> &mut Self {
        self.push(path.into(), RouteKind::Raw, RouteLayout::None, methods)
            .skip_antiforgery()
    }

    /// Exempt the most recently registered route from token validation.
    pub fn skip_antiforgery(&mut self) -> &mut Self {
        if let Some(last) = self.pending.last_mut() {
            last.entry.antiforgery = false;
        }
        self
    }

    pub fn table(&self) -> Vec<RouteEntry> {
        self.pending.iter().map(|pending| pending.entry.clone()).collect()
    }

    pub fn into_router(self, state: &AppState) -> Router<AppState> {
        self.pending
            .into_iter()
            .fold(Router::new(), |router, pending| {
                let Pending {
                    entry,
                    layout,
                    methods,
                } = pending;

                let methods = match entry.kind {
                    RouteKind::Raw => methods,
                    RouteKind::Page | RouteKind::Fragment => methods.layer(from_fn_with_state(
                        RouteGuard {
                            state: state.clone(),
                            layout,
                            antiforgery: entry.antiforgery,
                        },
                        guard_route,
                    )),
                };
                router.route(&entry.path, methods)
            })
    }

    fn push(
        &mut self,
        path: String,
        kind: RouteKind,
        layout: RouteLayout,
        methods: MethodRouter<AppState>,
    ) -> &mut Self {
        let entry = RouteEntry {
            path,
            kind,
            layout: match &layout {
                RouteLayout::Default => Some("default"),
                RouteLayout::Explicit(layout) => Some(layout.name()),
                RouteLayout::None => None,
            },
            antiforgery: true,
        };
        self.pending.push(Pending {
            entry,
            layout,
            methods,
        });
        self
    }
}

pub type Registration = fn(&mut RouteRegistrar);

pub const REGISTRATIONS: &[Registration] = &[
    home::register,
    counter::register,
    items::register,
    error::register,
    assets::register,
];

pub fn collect(registrations: &[Registration], protocol: &ProtocolSettings) -> RouteRegistrar {
    let mut registrar = RouteRegistrar::new(protocol);
    for register in registrations {
        register(&mut registrar);
    }
    registrar
}

/// Registered routes in registration order.
pub fn route_table(protocol: &ProtocolSettings) -> Vec<RouteEntry> {
    collect(REGISTRATIONS, protocol).table()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::routing::{get, post};

    use super::*;
    use crate::application::{
        layout::{Layout, PageContent},
        render::{RenderContext, RenderError},
    };

    async fn noop() {}

    fn protocol() -> ProtocolSettings {
        ProtocolSettings::default()
    }

    #[test]
    fn registrar_records_kind_and_layout() {
        let mut registrar = RouteRegistrar::new(&protocol());
        registrar
            .page("/", get(noop))
            .fragment("/save", post(noop))
            .skip_antiforgery()
            .raw("/static/{*path}", get(noop));

        let table = registrar.table();
        assert_eq!(table.len(), 3);
        assert_eq!(table[0].kind, RouteKind::Page);
        assert_eq!(table[0].layout, Some("default"));
        assert!(table[0].antiforgery);
        assert_eq!(table[1].kind, RouteKind::Fragment);
        assert_eq!(table[1].layout, None);
        assert!(!table[1].antiforgery);
        assert_eq!(table[2].kind, RouteKind::Raw);
        assert!(!table[2].antiforgery);
    }

    #[test]
    fn explicit_layout_is_named_in_the_table() {
        struct Print;

        impl Layout for Print {
            fn name(&self) -> &'static str {
                "print"
            }

            fn render(
                &self,
                content: PageContent,
                _ctx: &mut RenderContext,
            ) -> Result<String, RenderError> {
                Ok(content.main)
            }
        }

        let mut registrar = RouteRegistrar::new(&protocol());
        registrar.page_with("/receipt", Arc::new(Print), get(noop));

        let table = registrar.table();
        assert_eq!(table[0].kind, RouteKind::Page);
        assert_eq!(table[0].layout, Some("print"));
    }

    #[test]
    fn error_route_follows_protocol_settings() {
        let settings = ProtocolSettings {
            error_route: "/oops".to_string(),
            ..ProtocolSettings::default()
        };
        let table = route_table(&settings);
        let entry = table
            .iter()
            .find(|entry| entry.path == "/oops")
            .expect("error route registered");
        assert_eq!(entry.kind, RouteKind::Fragment);
    }

    #[test]
    fn application_registers_every_demo_route() {
        let paths: Vec<_> = route_table(&protocol())
            .into_iter()
            .map(|entry| entry.path)
            .collect();
        for expected in ["/", "/counter", "/counter/increment", "/items", "/error"] {
            assert!(paths.iter().any(|path| path == expected), "missing {expected}");
        }
    }
}
