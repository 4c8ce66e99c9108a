use std::io::Write;

use color_eyre::{eyre::WrapErr, Result};
use jsonvault_core::storage::Mapping;
use jsonvault_storage::{secret_source::generate_secret, JsonStore};
use serde_json::Value;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::{cli::Command, storage::OpenStore};

/// Execute a store subcommand, writing user-facing output to `out`.
pub fn run(command: Command, opened: &mut OpenStore, out: &mut dyn Write) -> Result<()> {
    match command {
        Command::Init => init(&mut opened.store, out),
        Command::Get { key } => get(&mut opened.store, &key, out),
        Command::Set { key, value } => set(&mut opened.store, key, &value, out),
        Command::Delete { key } => delete(&mut opened.store, &key, out),
        Command::Keys => keys(&mut opened.store, out),
        Command::Dump => dump(&mut opened.store, out),
        Command::Rekey { new_secret } => rekey(opened, new_secret, out),
        Command::Version | Command::Config(_) => {
            color_eyre::eyre::bail!("not a store command")
        }
    }
}

fn init(store: &mut JsonStore, out: &mut dyn Write) -> Result<()> {
    store.load(true)?;
    writeln!(out, "Store ready at {}", store.data_path().display())?;
    Ok(())
}

fn get(store: &mut JsonStore, key: &str, out: &mut dyn Write) -> Result<()> {
    store.load(false)?;
    let value = store.get_item(key)?;
    writeln!(out, "{}", serde_json::to_string_pretty(value)?)?;
    Ok(())
}

fn set(store: &mut JsonStore, key: String, raw: &str, out: &mut dyn Write) -> Result<()> {
    store.load(true)?;
    let value = parse_value(raw);
    let message = format!("Set {key}");
    store.set_item(key, value)?;
    store.save()?;
    writeln!(out, "{message}")?;
    Ok(())
}

fn delete(store: &mut JsonStore, key: &str, out: &mut dyn Write) -> Result<()> {
    store.load(false)?;
    store.delete_item(key)?;
    store.save()?;
    writeln!(out, "Deleted {key}")?;
    Ok(())
}

fn keys(store: &mut JsonStore, out: &mut dyn Write) -> Result<()> {
    store.load(false)?;
    if store.is_empty()? {
        writeln!(out, "Store is empty. Add a value with `jsonvault set <key> <value>`.")?;
        return Ok(());
    }
    for key in store.keys()? {
        writeln!(out, "{key}")?;
    }
    Ok(())
}

fn dump(store: &mut JsonStore, out: &mut dyn Write) -> Result<()> {
    store.load(false)?;
    writeln!(out, "{}", serde_json::to_string_pretty(store.mapping()?)?)?;
    Ok(())
}

fn rekey(opened: &mut OpenStore, new_secret: Option<String>, out: &mut dyn Write) -> Result<()> {
    let Some(source) = opened.secrets.as_ref() else {
        color_eyre::eyre::bail!("rekey requires an encrypted store");
    };
    if new_secret.is_none() && !source.can_replace() {
        color_eyre::eyre::bail!(
            "--new-secret is required when the secret comes from {}",
            source.name()
        );
    }

    let store = &mut opened.store;
    store.load(false)?;
    let secret = new_secret.map(Zeroizing::new).unwrap_or_else(generate_secret);

    // The source holds the new secret before any data is sealed with it.
    let previous = if source.can_replace() {
        let previous = source.secret()?;
        source
            .replace(&secret)
            .wrap_err("could not save the new secret; store left unchanged")?;
        Some(previous)
    } else {
        None
    };

    store.set_secret(secret.as_str())?;
    if let Err(err) = store.save() {
        if let Some(previous) = previous {
            if let Err(restore) = source.replace(&previous) {
                warn!(source = source.name(), %restore, "could not restore the previous secret");
            }
        }
        return Err(err).wrap_err("re-key failed");
    }
    info!(source = source.name(), "store re-keyed");

    if previous.is_some() {
        writeln!(out, "Re-keyed; {} secret updated.", source.name())?;
    } else {
        writeln!(
            out,
            "Re-keyed. Update the {} secret before the next run.",
            source.name()
        )?;
    }
    Ok(())
}

/// JSON if it parses, otherwise the raw text as a JSON string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
