use std::io::Read;
use std::path::Path;

use anyhow::Context;
use onenode_text::MessageCleaner;
use tracing::info;

pub fn clean(file: Option<&Path>) -> anyhow::Result<()> {
    println!("{}", clean_input(file)?);
    Ok(())
}

/// Read message content from `file` or stdin and clean it.
fn clean_input(file: Option<&Path>) -> anyhow::Result<String> {
    let content = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            buf
        }
    };

    let cleaner = MessageCleaner::new()?;
    let (cleaned, references) = cleaner.clean(&content);

    for reference in references.iter() {
        info!(placeholder = %reference.placeholder, original = %reference.original, "image reference");
    }
    Ok(cleaned)
}
