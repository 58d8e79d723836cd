//! Certificate commands: `ctrack certificate issue|verify`.

use anyhow::Result;
use chrono::Utc;

use coursetrack_core::certificate::verify_certificate;
use coursetrack_core::store::Store;

use crate::config::Config;
use crate::progress::format_ts;
use crate::sqlite_store::SqliteStore;

pub async fn run_issue(config: &Config, enrollment_id: i64) -> Result<()> {
    let store = SqliteStore::connect(config).await?;
    let cert = store.issue_certificate(enrollment_id, Utc::now()).await?;

    println!("certificate:  {}", cert.id);
    println!("enrollment:   {}", cert.enrollment_id);
    println!("code:         {}", cert.verification_code);
    println!("issued_at:    {}", format_ts(Some(cert.issued_at)));

    store.close().await;
    Ok(())
}

pub async fn run_verify(config: &Config, code: &str) -> Result<()> {
    let store = SqliteStore::connect(config).await?;
    let found = verify_certificate(&store, code).await?;
    store.close().await;

    match found {
        Some(cert) => {
            println!("valid: enrollment {}", cert.enrollment_id);
            println!("issued_at: {}", format_ts(Some(cert.issued_at)));
            Ok(())
        }
        None => anyhow::bail!("certificate not found: {}", code),
    }
}
