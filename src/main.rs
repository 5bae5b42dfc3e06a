//! Opens one console window attached to the shell of a VM.

use anyhow::{Context as _, Result};
use clap::Parser;
use gpui::{AppContext, Bounds, WindowBounds, WindowOptions, px, size};
use gpui_vm_console::{
    ConsoleConfig, ConsoleController, ConsoleView, ContainerSize, SessionDescriptor, TokenStore,
    WebSocketConnector,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const WINDOW_WIDTH: f32 = 960.0;
const WINDOW_HEIGHT: f32 = 600.0;

#[derive(Parser)]
#[command(name = "gpui-vm-console")]
#[command(about = "Terminal console for a remote VM")]
#[command(version)]
struct Cli {
    /// Id of the VM to attach to
    vm_id: String,

    /// Display name of the VM
    #[arg(short, long)]
    name: Option<String>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// WebSocket endpoint, overrides the configuration
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Font size in pixels, overrides the configuration
    #[arg(long)]
    font_size: Option<f32>,

    /// Bearer token for the console service
    #[arg(long, env = "VM_CONSOLE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("gpui_vm_console=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gpui_vm_console=info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let mut config = ConsoleConfig::load_or_default(cli.config.as_deref())?;
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint;
    }
    if let Some(font_size) = cli.font_size {
        config.font_size = font_size;
    }
    config.validate()?;

    let mut descriptor = SessionDescriptor::new(cli.vm_id);
    if let Some(name) = cli.name {
        descriptor = descriptor.with_name(name);
    }

    let credentials = Arc::new(TokenStore::new());
    if let Some(token) = cli.token {
        credentials.set(token);
    }
    let connector = Arc::new(WebSocketConnector::new(&config.endpoint)?);

    info!(vm = %descriptor.label(), endpoint = %config.endpoint, "opening console");
    let controller = ConsoleController::mount(
        descriptor.clone(),
        credentials,
        connector,
        config.surface_options(),
        Some(ContainerSize::new(WINDOW_WIDTH, WINDOW_HEIGHT)),
    )
    .context("failed to create terminal surface")?;

    let app = gpui::Application::new();
    app.run(move |cx| {
        let bounds = Bounds::centered(None, size(px(WINDOW_WIDTH), px(WINDOW_HEIGHT)), cx);
        let options = WindowOptions {
            window_bounds: Some(WindowBounds::Windowed(bounds)),
            titlebar: Some(gpui::TitlebarOptions {
                title: Some(format!("Console: {}", descriptor.label()).into()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let opened = cx.open_window(options, |window, cx| {
            cx.new(|cx| {
                ConsoleView::new(controller, &config, window, cx)
                    .with_close_callback(|_window, cx| cx.quit())
            })
        });
        if let Err(err) = opened {
            tracing::error!(%err, "failed to open console window");
            cx.quit();
        }
    });

    Ok(())
}
