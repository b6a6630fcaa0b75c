use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

/// API Gateway proxy integration expects this exact field casing.
#[derive(Debug, Serialize)]
struct Response {
    #[serde(rename = "statusCode")]
    status_code: u16,
    headers: Value,
    body: String,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    shared::log::init();

    lambda_runtime::run(service_fn(func)).await?;
    Ok(())
}

async fn func(event: LambdaEvent<Value>) -> Result<Response, Error> {
    info!("handling request {}", event.context.request_id);

    Ok(greeting())
}

fn greeting() -> Response {
    Response {
        status_code: 200,
        headers: json!({ "Content-Type": "application/json" }),
        body: json!({ "message": "Hello from Lambda!" }).to_string(),
    }
}
