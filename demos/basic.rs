use ucotron_http::{AugmentParams, LearnParams, SearchParams, UcotronClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let client = UcotronClient::from_env()?;

    let health = client.health().await?;
    println!("server {} is {}", health.version, health.status);

    client
        .learn(
            "Juan lives in Berlin and works on search infrastructure.",
            LearnParams::default(),
        )
        .await?;

    let hits = client
        .search(
            "Where does Juan live?",
            SearchParams {
                limit: Some(3),
                ..SearchParams::default()
            },
        )
        .await?;
    for item in hits.results {
        println!("{:.3} {}", item.score, item.content);
    }

    let context = client
        .augment("Tell me about Juan", AugmentParams::default())
        .await?;
    println!("{}", context.context_text);

    Ok(())
}
