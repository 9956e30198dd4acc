//! Catalog (connector) configuration.

use std::fs;
use std::io::ErrorKind;

use tracing::debug;

use crate::commands::{remote_join, ALL_ROLES, REMOTE_CATALOG_DIR};
use crate::conf::ConfigStore;
use crate::error::{AdminError, Result};
use crate::executor::{HostContext, Task, TaskValue};
use crate::session::shell_quote;

pub fn add() -> Task {
    Task::new("catalog add", add_catalog)
        .optional_arg("name")
        .summary("Deploy catalog configuration from <config-dir>/catalog")
        .help(
            "With a name, deploys <config-dir>/catalog/<name>.properties. Without one, \
             deploys every catalog there. Each file must set connector.name.",
        )
        .roles(&ALL_ROLES)
        .parallel()
}

pub fn remove() -> Task {
    Task::new("catalog remove", remove_catalog)
        .arg("name")
        .summary("Remove a catalog from the cluster")
        .roles(&ALL_ROLES)
        .parallel()
}

async fn add_catalog(cx: HostContext, args: Vec<String>) -> Result<TaskValue> {
    let store = ConfigStore::new(&cx.settings().config_dir);
    let names = match args.first() {
        Some(name) => vec![name.clone()],
        None => store.catalog_names()?,
    };
    if names.is_empty() {
        return Err(AdminError::config(format!(
            "No catalogs found in {}",
            store.catalog_dir().display()
        )));
    }

    let mut catalogs = Vec::with_capacity(names.len());
    for name in &names {
        catalogs.push((name, store.read_catalog(name)?));
    }

    cx.sudo(&format!("mkdir -p {}", REMOTE_CATALOG_DIR)).await?;
    for (name, props) in catalogs {
        let remote = remote_join(REMOTE_CATALOG_DIR, &format!("{}.properties", name));
        cx.upload(props.to_string().as_bytes(), &remote, true).await?;
        cx.say(format!("Deployed catalog {}", name));
    }
    Ok(TaskValue::None)
}

async fn remove_catalog(cx: HostContext, args: Vec<String>) -> Result<TaskValue> {
    let name = &args[0];
    let remote = remote_join(REMOTE_CATALOG_DIR, &format!("{}.properties", name));
    let exists = cx
        .sudo_unchecked(&format!("test -f {}", shell_quote(&remote)))
        .await?
        .succeeded();
    if !exists {
        return Err(AdminError::config(format!(
            "Could not remove catalog '{}'. No such file '{}'",
            name, remote
        )));
    }
    cx.sudo(&format!("rm -f {}", shell_quote(&remote))).await?;

    let local = ConfigStore::new(&cx.settings().config_dir)
        .catalog_dir()
        .join(format!("{}.properties", name));
    match fs::remove_file(&local) {
        Ok(()) => debug!(path = %local.display(), "Removed local catalog"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    cx.say(format!("Removed catalog {}", name));
    Ok(TaskValue::None)
}
