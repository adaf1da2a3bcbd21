mod common;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use common::*;
use lavasource::{SpotifyAdapter, TidalAdapter};
use lavastream::{Gateway, api_rest::create_router};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

const TRACK_ID: &str = "4cOdK2wGLETKBW3PvgPWqT";
const EPISODE_ID: &str = "512ojhOuo1ktJprKbVcKyQ";

fn router() -> Router {
    let spotify = FakeSpotify::new()
        .with_track(TRACK_ID, "OGG_VORBIS_320", SpotifyBody::Bytes(Vec::new()))
        .with_episode(
            EPISODE_ID,
            "OGG_VORBIS_160",
            SpotifyBody::Bytes(vorbis_stream(10)),
        );
    let gateway = Gateway::builder()
        .adapter(SpotifyAdapter::from_api(Arc::new(spotify)))
        .adapter(TidalAdapter::from_api(
            Arc::new(FakeTidal::flac()),
            Arc::new(StaticFetcher {
                url: TIDAL_URL.to_string(),
                body: Vec::new(),
            }),
        ))
        .build()
        .unwrap();
    create_router(Arc::new(gateway))
}

async fn json(router: Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::get(uri).body(Body::empty()).unwrap();
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn album_lists_its_tracks() {
    let (status, body) = json(router(), &format!("/album/{}", ALBUM_ID)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"], "Success");
    assert_eq!(body["data"]["name"], "Whenever You Need Somebody");
    assert_eq!(body["data"]["artists"][0]["name"], "Rick Astley");
    let tracks = body["data"]["tracks"].as_array().unwrap();
    assert_eq!(tracks.len(), 1);
    assert_eq!(tracks[0]["id"], TRACK_ID);
    assert_eq!(tracks[0]["duration"], 213_573);
}

#[tokio::test]
async fn catalog_errors_use_the_envelope() {
    let (status, body) = json(router(), "/album/short").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
    assert!(body["data"].is_null());

    let (status, body) = json(router(), &format!("/playlist/{}", ALBUM_ID)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 404);

    // the client has no podcast catalog
    let (status, _) = json(router(), &format!("/show/{}", ALBUM_ID)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = json(
        router(),
        "/tidal/playlist/36ea71a8-445e-41a4-82ab-6628c581535d",
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = json(router(), "/deezer/artist/27").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("deezer"));
}

#[tokio::test]
async fn region_is_the_account_country() {
    let (status, body) = json(router(), "/meta/region").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], "SE");
}

#[tokio::test]
async fn episode_metadata_and_audio() {
    let (status, body) = json(router(), &format!("/episode/{}", EPISODE_ID)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], "Episode 1");
    assert_eq!(body["data"]["show"], "The Show");
    assert_eq!(body["data"]["publisher"], "Studio");
    assert_eq!(body["data"]["duration"], 1_800_000);

    let request = Request::get(format!("/episode/{}/listen", EPISODE_ID))
        .body(Body::empty())
        .unwrap();
    let response = router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/ogg");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        format!("inline; filename=\"episode_{}.ogg\"", EPISODE_ID).as_str()
    );
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(body.starts_with(b"OggS"));
    assert!(body.windows(8).any(|w| w == b"The Show"));
}

#[tokio::test]
async fn tracks_and_episodes_do_not_mix() {
    let (status, _) = json(router(), &format!("/episode/{}", TRACK_ID)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let request = Request::get(format!("/{}/listen", EPISODE_ID))
        .body(Body::empty())
        .unwrap();
    let response = router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
