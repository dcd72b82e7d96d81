use anyhow::Context;
use onenode_stream::StreamClient;

pub async fn backend_config(client: &StreamClient) -> anyhow::Result<()> {
    let config = client
        .backend_config()
        .await
        .context("failed to fetch backend config")?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

pub async fn generate_title(
    client: &StreamClient,
    token: Option<&str>,
    payload: &str,
) -> anyhow::Result<()> {
    let payload: serde_json::Value =
        serde_json::from_str(payload).context("title payload is not valid JSON")?;
    let title = client
        .generate_title(token, &payload)
        .await
        .context("failed to generate title")?;
    println!("{}", serde_json::to_string_pretty(&title)?);
    Ok(())
}
