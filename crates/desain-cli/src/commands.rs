use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use chrono::Local;
use desain_core::attachment::LocalFile;
use desain_core::record::{DesignRecord, StatusView};
use desain_core::session::UserIdentity;
use desain_service::RecordService;
use desain_store::{file_name_from_url, ObjectStore};
use desain_sync::{NewDesign, RecordStore, SessionGate};
use tracing::warn;

use crate::config::Command;

/// Everything a command needs, built once in `main`.
pub struct Context {
    pub records: Arc<dyn RecordService>,
    pub blobs: Arc<dyn ObjectStore>,
    pub gate: Arc<SessionGate>,
}

impl Context {
    fn store(&self, view: StatusView) -> RecordStore {
        RecordStore::new(
            view,
            self.records.clone(),
            self.blobs.clone(),
            self.gate.clone(),
        )
    }

    /// The loaded view that currently holds `id`.
    async fn locate(&self, id: &str) -> Result<RecordStore> {
        for view in StatusView::ALL {
            let store = self.store(*view);
            let records = store.load().await?;
            if records.iter().any(|r| r.id == id) {
                return Ok(store);
            }
        }
        bail!("no request with id {id}")
    }
}

pub async fn run(command: Command, ctx: &Context) -> Result<()> {
    match command {
        Command::Register { email, password } => {
            match ctx.gate.sign_up(&email, &password).await? {
                Some(user) => println!("registered and signed in as {}", label(&user)),
                None => println!("check {email} for a confirmation link, then log in"),
            }
        }
        Command::Login { email, password } => {
            let user = ctx.gate.sign_in(&email, &password).await?;
            println!("signed in as {}", label(&user));
        }
        Command::Logout => {
            if ctx.gate.current_user().is_none() {
                println!("not signed in");
                return Ok(());
            }
            if let Err(e) = ctx.gate.sign_out().await {
                warn!("{e}");
            }
            println!("signed out");
        }
        Command::Whoami => match ctx.gate.current_user() {
            Some(user) => println!("{}", label(&user)),
            None => println!("not signed in"),
        },
        Command::List { view, search } => {
            let store = ctx.store(view);
            store.load().await?;
            let records = store.filtered(search.as_deref().unwrap_or_default());
            if records.is_empty() {
                println!("no requests in the {view} view");
            }
            for record in &records {
                print!("{}", format_record(record));
            }
        }
        Command::Submit {
            client,
            date,
            briefing,
            files,
        } => {
            let files = read_files(&files).await?;
            let store = ctx.store(StatusView::New);
            let record = store
                .submit(NewDesign {
                    client_name: client,
                    briefing_date: date.unwrap_or_else(|| Local::now().date_naive()),
                    briefing_text: briefing,
                    files,
                })
                .await?;
            println!("submitted request {} for {}", record.id, record.client_name);
        }
        Command::Edit {
            id,
            briefing,
            add,
            remove,
        } => {
            let store = ctx.locate(&id).await?;
            let mut edit = store.begin_edit(&id)?;
            if let Some(text) = briefing {
                edit.briefing_text = text;
            }
            for file in read_files(&add).await? {
                edit.attachments.stage_add(file);
            }
            for uri in &remove {
                if !edit.attachments.stage_remove(uri) {
                    bail!("{uri} is not attached to request {id}");
                }
            }
            match store.save_edit(edit).await? {
                Some(record) => {
                    println!("updated request {}", record.id);
                    print!("{}", format_record(&record));
                }
                None => println!("nothing to change"),
            }
        }
        Command::Approve { id } => {
            let record = ctx.locate(&id).await?.approve(&id).await?;
            println!("request {} is {}", record.id, record.status);
        }
        Command::Seen { id } => {
            ctx.locate(&id).await?.mark_result_seen(&id).await?;
            println!("results of request {id} marked as seen");
        }
        Command::Remove { id } => {
            ctx.locate(&id).await?.remove(&id).await?;
            println!("deleted request {id}");
        }
    }
    Ok(())
}

async fn read_files(paths: &[impl AsRef<Path>]) -> Result<Vec<LocalFile>> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let path = path.as_ref();
        let file = LocalFile::read(path)
            .await
            .with_context(|| format!("read {}", path.display()))?;
        files.push(file);
    }
    Ok(files)
}

fn label(user: &UserIdentity) -> String {
    match &user.email {
        Some(email) => format!("{email} ({})", user.id),
        None => user.id.clone(),
    }
}

fn format_record(record: &DesignRecord) -> String {
    let mut marks = Vec::new();
    if !record.result_seen {
        marks.push("new results");
    }
    if !record.briefing_seen {
        marks.push("briefing changed");
    }
    let marks = if marks.is_empty() {
        String::new()
    } else {
        format!("  [{}]", marks.join(", "))
    };

    let mut out = format!(
        "{:>6}  {:<11}  {}  {}{marks}\n",
        record.id,
        record.status.display_name(),
        record.briefing_date,
        record.client_name,
    );
    if !record.briefing_text.is_empty() {
        out.push_str(&format!("        {}\n", record.briefing_text));
    }
    for url in &record.reference_files {
        out.push_str(&format!("        ref     {}  {url}\n", file_name_from_url(url)));
    }
    for url in &record.result_files {
        out.push_str(&format!("        result  {}  {url}\n", file_name_from_url(url)));
    }
    out
}
