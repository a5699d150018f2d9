//! Admin event publishing commands (`clear`, `logout`, `link`).

use super::env_config;
use pixboard_core::Color;
use pixboard_protocol::{timestamp_ms, AdminEvent, CanvasClearEvent, LinkEvent, LogoutEvent};
use pixboard_server::publish_remote;
use std::net::SocketAddr;

/// Wipes the canvas of a running server.
pub fn clear(
    admin: Option<SocketAddr>,
    by: Option<String>,
    color: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = env_config()?;
    let default_color = match color {
        Some(raw) => Color::parse(&raw)?.into_string(),
        None => config.default_color()?.into_string(),
    };

    let event = AdminEvent::CanvasClear(CanvasClearEvent {
        admin_id: by,
        timestamp: timestamp_ms(),
        width: config.width,
        height: config.height,
        default_color,
        grid: None,
    });
    send(admin.or(config.admin_addr), &event)?;
    println!("Canvas {}x{} cleared", config.width, config.height);
    Ok(())
}

/// Ends every session of `user_id`.
pub fn logout(admin: Option<SocketAddr>, user_id: String) -> Result<(), Box<dyn std::error::Error>> {
    let config = env_config()?;
    let event = AdminEvent::Logout(LogoutEvent {
        user_id: user_id.clone(),
    });
    send(admin.or(config.admin_addr), &event)?;
    println!("Logout sent for {user_id}");
    Ok(())
}

/// Notifies clients waiting on an account link.
pub fn link(
    admin: Option<SocketAddr>,
    user_id: String,
    client_token: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = env_config()?;
    let event = AdminEvent::Link(LinkEvent {
        user_id: user_id.clone(),
        client_token,
    });
    send(admin.or(config.admin_addr), &event)?;
    println!("Link notification sent for {user_id}");
    Ok(())
}

fn send(admin: Option<SocketAddr>, event: &AdminEvent) -> Result<(), Box<dyn std::error::Error>> {
    let addr = admin.ok_or("Admin listener disabled; pass --admin")?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(publish_remote(addr, event))?;
    Ok(())
}
