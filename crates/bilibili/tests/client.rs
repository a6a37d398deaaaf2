use bangumi::{BangumiError, Episode, MetadataSource};
use bangumi_bilibili::BiliClient;
use serde_json::json;
use wiremock::{
    matchers::{header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

async fn setup_client() -> anyhow::Result<(BiliClient, MockServer)> {
    let mock_server = MockServer::start().await;
    let client = BiliClient::new("bangumi-test")?.with_base_url(&mock_server.uri())?;
    Ok((client, mock_server))
}

fn season_body(season_id: u64) -> serde_json::Value {
    json!({
        "code": 0,
        "message": "success",
        "result": {
            "season_id": season_id,
            "title": "Show",
            "episodes": [
                {
                    "aid": 11,
                    "cid": 12,
                    "id": 327584,
                    "share_copy": "《Show》第1话",
                    "share_url": "https://www.bilibili.com/bangumi/play/ep327584"
                },
                { "aid": 21, "cid": 22, "id": 327585, "share_copy": "《Show》第2话" }
            ]
        }
    })
}

trait BiliMock {
    async fn mock_json(&self, mock_path: &str, key: &str, value: &str, body: serde_json::Value);
}

impl BiliMock for MockServer {
    async fn mock_json(&self, mock_path: &str, key: &str, value: &str, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(mock_path))
            .and(query_param(key, value))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(self)
            .await;
    }
}

#[tokio::test]
async fn test_season_from_episode_url() -> anyhow::Result<()> {
    let (client, server) = setup_client().await?;
    server
        .mock_json("/pgc/view/web/season", "ep_id", "327584", season_body(33415))
        .await;

    let season = client
        .season_from_url("https://www.bilibili.com/bangumi/play/ep327584")
        .await?;

    assert_eq!(season.season_id, 33415);
    assert_eq!(season.title, "Show");
    assert_eq!(
        season.episodes,
        vec![
            Episode::new(11, 12)
                .with_share_copy("《Show》第1话")
                .with_share_url("https://www.bilibili.com/bangumi/play/ep327584"),
            Episode::new(21, 22).with_share_copy("《Show》第2话"),
        ]
    );

    Ok(())
}

#[tokio::test]
async fn test_season_from_season_url() -> anyhow::Result<()> {
    let (client, server) = setup_client().await?;
    server
        .mock_json("/pgc/view/web/season", "season_id", "33415", season_body(33415))
        .await;

    let season = client
        .season_from_url("https://www.bilibili.com/bangumi/play/ss33415")
        .await?;
    assert_eq!(season.episodes.len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_season_from_media_url() -> anyhow::Result<()> {
    let (client, server) = setup_client().await?;
    server
        .mock_json(
            "/pgc/review/user",
            "media_id",
            "28234679",
            json!({
                "code": 0,
                "message": "success",
                "result": { "media": { "media_id": 28234679, "season_id": 33415, "title": "Show" } }
            }),
        )
        .await;
    server
        .mock_json("/pgc/view/web/season", "season_id", "33415", season_body(33415))
        .await;

    let season = client
        .season_from_url("https://www.bilibili.com/bangumi/media/md28234679/")
        .await?;
    assert_eq!(season.season_id, 33415);

    Ok(())
}

#[tokio::test]
async fn test_play_info() -> anyhow::Result<()> {
    let (client, server) = setup_client().await?;
    let client = client.with_cookie("SESSDATA=abc;bili_jct=def");

    Mock::given(method("GET"))
        .and(path("/pgc/player/web/playurl"))
        .and(query_param("aid", "11"))
        .and(query_param("cid", "12"))
        .and(query_param("qn", "112"))
        .and(query_param("fnval", "4048"))
        .and(header("cookie", "SESSDATA=abc; bili_jct=def"))
        .and(header("referer", "https://www.bilibili.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "message": "success",
            "result": {
                "quality": 80,
                "support_formats": [
                    { "quality": 112, "format": "hdflv2", "new_description": "1080P 高码率", "display_desc": "1080P", "codecs": ["avc1.640032", "hev1.1.6.L150.90"] },
                    { "quality": 80, "format": "flv", "new_description": "1080P 高清", "display_desc": "1080P", "codecs": null }
                ],
                "dash": {
                    "audio": [
                        { "id": 30280, "codecs": "mp4a.40.2", "baseUrl": "https://cdn.test/30280.m4s", "base_url": "https://cdn.test/30280.m4s" }
                    ],
                    "video": [
                        { "id": 112, "codecs": "avc1.640032", "base_url": "https://cdn.test/112.m4s" }
                    ]
                }
            }
        })))
        .mount(&server)
        .await;

    let info = client.play_info(&Episode::new(11, 12), 112).await?;
    assert_eq!(info.support_formats.len(), 2);
    assert!(info.support_formats[1].codecs.is_empty());

    let selection = info.select(112).unwrap();
    assert_eq!(selection.format.format, "hdflv2");
    assert_eq!(selection.video.unwrap().base_url, "https://cdn.test/112.m4s");
    assert_eq!(selection.audio.unwrap().id, 30280);

    Ok(())
}

#[tokio::test]
async fn test_api_error() -> anyhow::Result<()> {
    let (client, server) = setup_client().await?;
    server
        .mock_json(
            "/pgc/view/web/season",
            "ep_id",
            "1",
            json!({ "code": -404, "message": "啥都木有" }),
        )
        .await;

    let result = client.season_by_ep_id(1).await;
    assert!(matches!(result, Err(BangumiError::Api { code: -404, .. })));

    Ok(())
}

#[tokio::test]
async fn test_http_error() -> anyhow::Result<()> {
    let (client, server) = setup_client().await?;
    Mock::given(method("GET"))
        .and(path("/pgc/player/web/playurl"))
        .respond_with(ResponseTemplate::new(412))
        .mount(&server)
        .await;

    let result = client.play_url(1, 2, 80).await;
    assert!(matches!(
        result,
        Err(BangumiError::HttpError(status)) if status.as_u16() == 412
    ));

    Ok(())
}

#[tokio::test]
async fn test_invalid_url() -> anyhow::Result<()> {
    let (client, _server) = setup_client().await?;

    let result = client
        .season_from_url("https://www.bilibili.com/bangumi/play/")
        .await;
    assert!(matches!(result, Err(BangumiError::InvalidUrl(_))));

    Ok(())
}
