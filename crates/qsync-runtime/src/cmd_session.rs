//! Session commands: login, logout, status.

use std::path::Path;

use qsync_core::types::Role;
use qsync_session::{FileSessionStorage, RehydrateOutcome, Session, SessionStore, initials};

use crate::cli::{LoginOpts, StatusOpts};

fn open_store(state_dir: &Path) -> SessionStore {
    SessionStore::new(Box::new(FileSessionStorage::new(state_dir)))
}

pub fn cmd_login(state_dir: &Path, opts: &LoginOpts) -> anyhow::Result<()> {
    let role: Role = opts.role.parse()?;
    let mut store = open_store(state_dir);
    store.set_session(Session {
        user_id: opts.user_id.clone(),
        display_name: opts.name.clone(),
        role,
        token: opts.token.clone(),
        persisted: false,
    })?;
    println!("logged in as {} ({role})", opts.name);
    Ok(())
}

pub fn cmd_logout(state_dir: &Path) -> anyhow::Result<()> {
    let mut store = open_store(state_dir);
    store.clear()?;
    println!("logged out");
    Ok(())
}

pub fn cmd_status(state_dir: &Path, opts: &StatusOpts) -> anyhow::Result<()> {
    let mut store = open_store(state_dir);
    let session = match store.rehydrate()? {
        RehydrateOutcome::Restored(session) => Some(session),
        RehydrateOutcome::Absent => None,
        RehydrateOutcome::Corrupt(e) => {
            eprintln!("persisted session was corrupt and has been cleared: {e}");
            None
        }
    };

    if opts.json {
        let body = match &session {
            Some(s) => serde_json::json!({
                "authenticated": true,
                "userId": s.user_id,
                "displayName": s.display_name,
                "initials": initials(&s.display_name),
                "role": s.role,
            }),
            None => serde_json::json!({ "authenticated": false }),
        };
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    match session {
        Some(s) => println!(
            "{} [{}] ({}), id {}",
            s.display_name,
            initials(&s.display_name),
            s.role,
            s.user_id
        ),
        None => println!("no session"),
    }
    Ok(())
}
