//! Reads one invocation as JSON from stdin, e.g.
//! `{"payload":{"items":3},"context":{"function_name":"PlaceOrder"}}`
//! and runs it through an instrumented handler.
use serde::{Deserialize, Serialize};
use signalfx_azure_function::{BoxError, Invocation};
use tracing::info;

#[derive(Deserialize)]
struct Order {
    items: u32,
}

#[derive(Serialize)]
struct Receipt {
    function: String,
    items: u32,
}

fn place_order(invocation: Invocation<Order>) -> Result<Receipt, BoxError> {
    if invocation.payload.items == 0 {
        return Err("an order needs at least one item".into());
    }

    info!("Placing order for {} items", invocation.payload.items);
    metrics::counter!("orders.items", "channel" => "web").increment(invocation.payload.items.into());

    Ok(Receipt {
        function: invocation.context.function_name,
        items: invocation.payload.items,
    })
}

fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
        .with_target(false)
        .without_time()
        .init();

    let mut handler = signalfx_azure_function::Builder::new()
        .with_dimension("team", "checkout")
        .init()?
        .instrument(place_order);

    let invocation: Invocation<Order> = serde_json::from_reader(std::io::stdin())?;
    let receipt = handler(invocation)?;

    println!("{}", serde_json::to_string(&receipt)?);
    Ok(())
}
