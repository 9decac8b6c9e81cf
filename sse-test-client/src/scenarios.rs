use crate::api_client::ApiClient;
use crate::output::TestResult;
use crate::sse_client::Connection;
use anyhow::Result;
use colored::*;
use std::time::{Duration, Instant};

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);
const CONVERSATION_SID: &str = "CH-sse-test-client";

fn new_message_sid() -> String {
    format!("IM{}", uuid::Uuid::new_v4().simple())
}

fn has_message_sid(message_sid: &str) -> impl Fn(&serde_json::Value) -> bool + '_ {
    move |data| data["messageSid"] == message_sid
}

/// Every stream must open with a `connected` frame carrying its id.
pub async fn test_connection(base_url: &str) -> Result<TestResult> {
    let name = "connection";
    let start = Instant::now();
    println!("{} Running {} scenario", "→".blue(), name);

    let mut connection = Connection::establish(base_url, "Agent 1".to_string()).await?;

    match connection.wait_for_event("connected", EVENT_TIMEOUT).await {
        Ok(event) if event.data["connectionId"].is_string() => {
            println!(
                "{} {} received connected ({})",
                "✓".green(),
                connection.label,
                event.data["connectionId"]
            );
            Ok(TestResult::pass(name, start.elapsed()))
        }
        Ok(event) => Ok(TestResult::fail(
            name,
            format!("connected frame without connectionId: {}", event.data),
            start.elapsed(),
        )),
        Err(e) => Ok(TestResult::fail(name, e.to_string(), start.elapsed())),
    }
}

/// Two open streams both receive a message and its delivery status.
pub async fn test_live_delivery(base_url: &str, api_client: &ApiClient) -> Result<TestResult> {
    let name = "live-delivery";
    let start = Instant::now();
    println!("{} Running {} scenario", "→".blue(), name);

    let mut agent1 = Connection::establish(base_url, "Agent 1".to_string()).await?;
    let mut agent2 = Connection::establish(base_url, "Agent 2".to_string()).await?;

    for connection in [&mut agent1, &mut agent2] {
        if let Err(e) = connection.wait_for_event("connected", EVENT_TIMEOUT).await {
            return Ok(TestResult::fail(
                name,
                format!("{}: {}", connection.label, e),
                start.elapsed(),
            ));
        }
    }

    let message_sid = new_message_sid();
    api_client
        .post_new_message(CONVERSATION_SID, &message_sid)
        .await?;
    api_client
        .post_delivery_status(&message_sid, "delivered")
        .await?;

    for connection in [&mut agent1, &mut agent2] {
        if let Err(e) = connection
            .wait_for("newMessage", EVENT_TIMEOUT, has_message_sid(&message_sid))
            .await
        {
            return Ok(TestResult::fail(
                name,
                format!("{} missed newMessage: {}", connection.label, e),
                start.elapsed(),
            ));
        }
        if let Err(e) = connection
            .wait_for(
                "deliveryStatusUpdate",
                EVENT_TIMEOUT,
                has_message_sid(&message_sid),
            )
            .await
        {
            return Ok(TestResult::fail(
                name,
                format!("{} missed deliveryStatusUpdate: {}", connection.label, e),
                start.elapsed(),
            ));
        }
        println!("{} {} received {}", "✓".green(), connection.label, message_sid);
    }

    Ok(TestResult::pass(name, start.elapsed()))
}

/// A message published into an empty room is replayed to the next stream.
/// Only meaningful when no other client is connected to the relay.
pub async fn test_recovery(base_url: &str, api_client: &ApiClient) -> Result<TestResult> {
    let name = "recovery";
    let start = Instant::now();
    println!("{} Running {} scenario", "→".blue(), name);

    let status = api_client.relay_status().await?;
    if status.connections > 0 {
        return Ok(TestResult::fail(
            name,
            format!(
                "relay has {} open connection(s), recovery needs an empty room",
                status.connections
            ),
            start.elapsed(),
        ));
    }

    let message_sid = new_message_sid();
    api_client
        .post_new_message(CONVERSATION_SID, &message_sid)
        .await?;

    let status = api_client.relay_status().await?;
    println!(
        "{} Relay holds {} buffered event(s), {} queued recovery item(s)",
        "→".blue(),
        status.buffered_events,
        status.queued_recoveries
    );

    let mut connection = Connection::establish(base_url, "Late agent".to_string()).await?;

    match connection
        .wait_for("newMessage", EVENT_TIMEOUT, has_message_sid(&message_sid))
        .await
    {
        Ok(_) => {
            println!("{} {} replayed {}", "✓".green(), connection.label, message_sid);
            Ok(TestResult::pass(name, start.elapsed()))
        }
        Err(e) => Ok(TestResult::fail(name, e.to_string(), start.elapsed())),
    }
}
