//! Integration tests for the framed codec.
//!
//! These exercise the property that matters most for a stream protocol:
//! however the bytes are chunked on arrival, the decoder yields the same
//! frames in the same order as decoding the whole buffer at once.

use serde_json::json;

use ttt_core::protocol::codec::{decode_request, decode_response, encode_request, encode_response};
use ttt_core::protocol::messages::{EventKind, Request, Response};
use ttt_core::FrameDecoder;

fn sample_stream() -> (Vec<u8>, Vec<Request>) {
    let requests = vec![
        Request::new(EventKind::Register, json!("alice")),
        Request::new(EventKind::Start, json!("")),
        Request::new(EventKind::Move, json!(4)),
        Request::new(EventKind::Deregister, json!("alice")),
    ];
    let mut stream = Vec::new();
    for request in &requests {
        stream.extend(encode_request(request).expect("encode"));
    }
    (stream, requests)
}

/// Decodes an entire byte stream fed in `chunk_size`-byte slices.
fn decode_in_chunks(stream: &[u8], chunk_size: usize) -> Vec<Request> {
    let mut decoder = FrameDecoder::new();
    let mut buf = Vec::new();
    let mut decoded = Vec::new();

    for chunk in stream.chunks(chunk_size) {
        buf.extend_from_slice(chunk);
        while let Some(frame) = decoder.decode(&mut buf).expect("decode") {
            decoded.push(decode_request(&frame).expect("request body"));
        }
    }

    assert!(buf.is_empty(), "every byte of the stream must be consumed");
    decoded
}

#[test]
fn test_whole_buffer_decode_yields_all_frames_in_order() {
    let (stream, requests) = sample_stream();
    let decoded = decode_in_chunks(&stream, stream.len());
    assert_eq!(decoded, requests);
}

#[test]
fn test_byte_by_byte_decode_matches_whole_buffer_decode() {
    let (stream, requests) = sample_stream();
    let decoded = decode_in_chunks(&stream, 1);
    assert_eq!(decoded, requests);
}

#[test]
fn test_every_chunk_size_yields_the_same_frames() {
    let (stream, requests) = sample_stream();
    for chunk_size in 1..=stream.len() {
        let decoded = decode_in_chunks(&stream, chunk_size);
        assert_eq!(
            decoded, requests,
            "chunk size {chunk_size} must not change the decoded stream"
        );
    }
}

#[test]
fn test_response_stream_round_trips_across_frame_boundaries() {
    let responses = vec![
        Response::reply(EventKind::Register.into(), true, json!("\"alice\" has joined the game.")),
        Response::push(EventKind::PlayerJoined, json!("\"bob\" has joined the game.")),
        Response::push(
            EventKind::BoardUpdate,
            json!([" ", " ", " ", " ", "X", " ", " ", " ", " "]),
        ),
        Response::push(EventKind::Fin, json!("alice has won. Game over.")),
    ];
    let mut stream = Vec::new();
    for response in &responses {
        stream.extend(encode_response(response).expect("encode"));
    }

    // Split mid-frame: feed the stream in two uneven halves.
    let split = stream.len() / 3;
    let mut decoder = FrameDecoder::new();
    let mut buf = Vec::new();
    let mut decoded = Vec::new();

    for chunk in [&stream[..split], &stream[split..]] {
        buf.extend_from_slice(chunk);
        while let Some(frame) = decoder.decode(&mut buf).expect("decode") {
            decoded.push(decode_response(&frame).expect("response body"));
        }
    }

    assert_eq!(decoded, responses);
}
