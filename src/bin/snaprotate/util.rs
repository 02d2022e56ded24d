use anyhow::{Context, Result};
use dialoguer::Password;

use snaprotate::ConnectParams;

use crate::cli::ConnArgs;

/// Connection parameters; the password is prompted for when not given.
pub fn connect_params(conn: &ConnArgs) -> Result<ConnectParams> {
    let password = match &conn.password {
        Some(p) => p.clone(),
        None => Password::new()
            .with_prompt(format!(
                "Enter password for host {} and user {}",
                conn.host, conn.user
            ))
            .allow_empty_password(true)
            .interact()
            .context("read password")?,
    };
    Ok(ConnectParams::new(conn.host.clone(), conn.user.clone(), password).with_port(conn.port))
}
