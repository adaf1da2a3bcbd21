mod common;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use bytes::Bytes;
use common::*;
use futures::StreamExt;
use lavasource::{PlaybackMode, SpotifyAdapter, TidalAdapter};
use lavastream::{Gateway, api_rest::create_router};
use serde_json::Value;
use std::io::Cursor;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const OGG_ID: &str = "abc123abc123abc123abc1";
const ENDLESS_ID: &str = "endlessendlessendless0";

fn spotify_router(spotify: FakeSpotify) -> Router {
    let gateway = Gateway::builder()
        .chunk_size(4096)
        .adapter(SpotifyAdapter::from_api(Arc::new(spotify)))
        .build()
        .unwrap();
    create_router(Arc::new(gateway))
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

async fn json(router: Router, uri: &str) -> (StatusCode, Value) {
    let response = router.oneshot(get(uri)).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn ogg_track_is_served_with_rewritten_comment_header() {
    let source = vorbis_stream(30);
    let audio_start = page_offset(&source, 2);
    let router = spotify_router(FakeSpotify::new().with_track(
        OGG_ID,
        "OGG_VORBIS_320",
        SpotifyBody::Bytes(source.clone()),
    ));

    let response = router
        .oneshot(get(&format!("/{}/listen", OGG_ID)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers().clone();
    assert_eq!(headers[header::CONTENT_TYPE], "audio/ogg");
    assert_eq!(headers[header::CACHE_CONTROL], "no-cache");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        format!("inline; filename=\"{}.ogg\"", OGG_ID).as_str()
    );
    let length: usize = headers[header::CONTENT_LENGTH]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(body.len(), length);
    assert!(body.starts_with(&source[..page_offset(&source, 1)]));
    assert!(body.ends_with(&source[audio_start..]));

    let mut reader = ogg::PacketReader::new(Cursor::new(body.to_vec()));
    reader.read_packet().unwrap().unwrap();
    let comment = reader.read_packet().unwrap().unwrap();
    let header = lewton::header::read_header_comment(&comment.data).unwrap();
    let value = |key: &str| {
        header
            .comment_list
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.clone())
    };
    assert_eq!(value("TITLE").as_deref(), Some("Never Gonna Give You Up"));
    assert_eq!(value("ARTIST").as_deref(), Some("Rick Astley"));
    assert_eq!(value("LENGTH").as_deref(), Some("213573"));
}

#[tokio::test]
async fn metadata_route_uses_the_json_envelope() {
    let router = spotify_router(FakeSpotify::new().with_track(
        OGG_ID,
        "OGG_VORBIS_320",
        SpotifyBody::Bytes(Vec::new()),
    ));

    let (status, body) = json(router.clone(), &format!("/{}", OGG_ID)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"], "Success");
    assert_eq!(body["code"], 200);
    assert_eq!(body["data"]["title"], "Never Gonna Give You Up");
    assert_eq!(body["data"]["duration"], 213_573);
    assert_eq!(body["data"]["provider"], "spotify");
    assert_eq!(body["data"]["encodings"][0]["format"], "vorbis");
    assert_eq!(body["data"]["encodings"][0]["quality"], "VERY_HIGH");

    let (status, body) = json(router.clone(), "/zzzzzzzzzzzzzzzzzzzzzz").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 404);
    assert!(body["data"].is_null());

    let (status, _) = json(router.clone(), "/not-a-spotify-id").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = json(router.clone(), "/deezer/3135556").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("deezer"));

    let response = router.oneshot(get("/")).await.unwrap();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"</>");
}

#[tokio::test]
async fn tidal_master_falls_back_to_stream_mode() {
    let api = Arc::new(FakeTidal::flac());
    let fetcher = Arc::new(StaticFetcher {
        url: TIDAL_URL.to_string(),
        body: flac_file(20),
    });
    let gateway = Gateway::builder()
        .adapter(TidalAdapter::from_api(api.clone(), fetcher))
        .build()
        .unwrap();
    let router = create_router(Arc::new(gateway));

    let response = router
        .oneshot(get("/tidal/77640617/listen"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/flac");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "inline; filename=\"track_77640617.flac\""
    );

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(body.starts_with(b"fLaC"));
    // STREAMINFO no longer last, followed by the new comment block
    assert_eq!(body[4], 0x00);
    assert_eq!(body[42] & 0x7F, 4);
    assert!(body.windows(6).any(|w| w == b"Master"));
    assert!(body.ends_with(&flac_file(20)[42..]));

    assert_eq!(
        *api.modes.lock().unwrap(),
        vec![PlaybackMode::Offline, PlaybackMode::Stream]
    );
}

#[tokio::test]
async fn client_disconnect_closes_the_session() {
    let source = EndlessSource::default();
    let router = spotify_router(FakeSpotify::new().with_track(
        ENDLESS_ID,
        "MP3_320",
        SpotifyBody::Endless(source.clone()),
    ));

    let response = router
        .oneshot(get(&format!("/{}/listen?fmt=mp3&q=hq", ENDLESS_ID)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
    assert!(response.headers().get(header::CONTENT_LENGTH).is_none());

    let mut body = response.into_body().into_data_stream();
    for _ in 0..3 {
        let chunk = body.next().await.unwrap().unwrap();
        assert_eq!(chunk.len(), 4096);
    }
    assert!(!source.closed.load(Ordering::SeqCst));

    drop(body);
    assert!(source.closed.load(Ordering::SeqCst));

    let reads = source.reads.load(Ordering::SeqCst);
    tokio::task::yield_now().await;
    assert_eq!(source.reads.load(Ordering::SeqCst), reads);
}

#[tokio::test]
async fn m4a_is_sent_only_once_fully_buffered() {
    let mdat = vec![0x6D; 9000];
    let file = m4a_file(&mdat);
    let (fetcher, tx) = ChannelFetcher::new(TIDAL_URL);
    let gateway = Gateway::builder()
        .adapter(TidalAdapter::from_api(
            Arc::new(FakeTidal::m4a()),
            Arc::new(fetcher),
        ))
        .build()
        .unwrap();
    let router = create_router(Arc::new(gateway));

    let request = tokio::spawn(router.oneshot(get("/tidal/77640617/listen")));
    let (first, rest) = file.split_at(5000);
    tx.unbounded_send(Ok(Bytes::copy_from_slice(first))).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    // nothing is answered while the source is still open
    assert!(!request.is_finished());

    tx.unbounded_send(Ok(Bytes::copy_from_slice(rest))).unwrap();
    drop(tx);
    let response = request.await.unwrap().unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mp4");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "inline; filename=\"track_77640617.m4a\""
    );
    let length: usize = response.headers()[header::CONTENT_LENGTH]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(body.len(), length);
    assert!(body.len() > file.len());
    assert!(body.windows(6).any(|w| w == b"Master"));
    assert!(body.ends_with(&mdat));
}
