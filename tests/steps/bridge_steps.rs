//! Steps for bridge correlation behavioural tests.
use cucumber::{given, then, when};

use crate::world::BridgeWorld;

#[given(expr = "a bridge routing {string} to the broker")]
async fn given_bridge(world: &mut BridgeWorld, name: String) { world.install(&name, false).await; }

#[given(expr = "a strict bridge routing {string} to the broker")]
async fn given_strict_bridge(world: &mut BridgeWorld, name: String) { world.install(&name, true).await; }

#[given(expr = "a responder answering on {string}")]
async fn given_responder(world: &mut BridgeWorld, queue: String) { world.respond_on(&queue, 1).await; }

#[given(expr = "a responder answering on {string} in batches of {int}")]
async fn given_batching_responder(world: &mut BridgeWorld, queue: String, batch: usize) {
    world.respond_on(&queue, batch).await;
}

#[when(expr = "a request {string} is sent to {string} with token {string}")]
async fn when_tagged_request(world: &mut BridgeWorld, payload: String, destination: String, token: String) {
    world.send(&destination, &payload, Some(&token)).await;
}

#[when(expr = "a request {string} is sent to {string} without a token")]
async fn when_untagged_request(world: &mut BridgeWorld, payload: String, destination: String) {
    world.send(&destination, &payload, None).await;
}

#[then(expr = "a reply {string} arrives with token {string}")]
async fn then_reply(world: &mut BridgeWorld, payload: String, token: String) {
    let reply = world.next_reply().await;
    assert_eq!(reply.payload_str(), Some(payload.as_str()));
    assert_eq!(reply.response_id(), Some(token.as_str()));
}

#[then("the request is refused")]
fn then_refused(world: &mut BridgeWorld) {
    let result = world.last_send().expect("a request was sent");
    let err = result.as_ref().expect_err("request should be refused");
    assert!(err.contains("responseId"), "unexpected error: {err}");
}

#[then(expr = "the broker queue {string} is empty")]
fn then_queue_empty(world: &mut BridgeWorld, queue: String) {
    assert_eq!(world.queue_depth(&queue), Some(0));
}
