use clap::Parser;

use super::*;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn defaults_resolve_without_sources() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
    assert_eq!(
        settings.render.queue_capacity.get(),
        DEFAULT_RENDER_QUEUE_CAPACITY
    );
    assert_eq!(settings.protocol.error_route, "/error");
    assert!(settings.protocol.redirect_fragment_errors);
    assert!(settings.protocol.antiforgery);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn zero_queue_capacity_is_rejected() {
    let mut raw = RawSettings::default();
    raw.render.queue_capacity = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero capacity");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "render.queue_capacity",
            ..
        }
    ));
}

#[test]
fn error_route_must_be_root_relative() {
    let mut raw = RawSettings::default();
    raw.protocol.error_route = Some("error".to_string());

    let err = Settings::from_raw(raw).expect_err("relative route");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "protocol.error_route",
            ..
        }
    ));
}

#[test]
fn protocol_toggles_can_be_disabled_via_cli() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        protocol_redirect_fragment_errors: Some(false),
        protocol_antiforgery: Some(false),
        protocol_error_route: Some("/oops".to_string()),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(!settings.protocol.redirect_fragment_errors);
    assert!(!settings.protocol.antiforgery);
    assert_eq!(settings.protocol.error_route, "/oops");
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["patchwork"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_routes_command() {
    let args = CliArgs::parse_from(["patchwork", "routes"]);
    assert!(matches!(args.command, Some(Command::Routes)));
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "patchwork",
        "serve",
        "--server-host",
        "0.0.0.0",
        "--render-queue-capacity",
        "8",
        "--protocol-antiforgery",
        "false",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(serve.overrides.render_queue_capacity, Some(8));
            assert_eq!(serve.overrides.protocol_antiforgery, Some(false));
        }
        _ => panic!("wrong command parsed"),
    }
}
