//! `restore`: turn a delivered session payload back into `creds.json`.

use std::io::Read;
use std::path::{Path, PathBuf};

use clap::Args;

use crate::session::unpack;
use crate::store::CREDENTIALS_KEY;

#[derive(Args, Debug, Clone)]
pub struct RestoreArgs {
    /// The delivered payload (`Buddy~...`), or `-` to read it from stdin
    pub payload: String,

    /// Directory to write creds.json into
    #[arg(short, long, default_value = ".")]
    pub out: PathBuf,
}

/// Decode the payload and write the credential file. Returns its path.
pub fn restore_to(payload: &str, out: &Path) -> crate::error::Result<PathBuf> {
    let data = unpack(payload)?;
    std::fs::create_dir_all(out).map_err(crate::error::StoreError::from)?;
    let path = out.join(CREDENTIALS_KEY);
    std::fs::write(&path, &data).map_err(crate::error::StoreError::from)?;
    Ok(path)
}

pub fn run_restore_command(args: RestoreArgs) -> anyhow::Result<()> {
    let payload = if args.payload == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        args.payload
    };

    let path = restore_to(&payload, &args.out)?;
    println!("Wrote {}", path.display());
    Ok(())
}
