use std::convert::Infallible;

use radosgw_assume::AssumeFlow;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let flow = AssumeFlow::new(|verification| async move {
        println!("{verification}");
        Ok::<_, Infallible>(())
    })
    .await?;

    let credentials = flow.authenticate().await?;

    dbg!(credentials);

    Ok(())
}
