use mockito::{Matcher, Server, ServerGuard};
use onshape_exporter_bom::RevisionType;
use onshape_exporter_client::{
    ApiResponse, ClientError, Credentials, OnshapeClient, OnshapeClientConfig, ShadedViewOptions,
};
use serde_json::{json, Value};

fn client_for(server: &ServerGuard) -> OnshapeClient {
    let config = OnshapeClientConfig {
        base_url: server.url(),
        ..Default::default()
    };
    OnshapeClient::new(Credentials::new("access", "secret"), config).unwrap()
}

fn bom_payload() -> Value {
    json!({
        "bomTable": {
            "id": "bom1",
            "items": [
                {
                    "name": "Bracket",
                    "description": "Printed motor bracket",
                    "material": {"id": "PETG", "displayName": "PETG"},
                    "quantity": 2,
                    "itemSource": {
                        "fullConfiguration": "default",
                        "documentId": "d1",
                        "elementId": "ps1",
                        "wvmType": "w",
                        "wvmId": "w1",
                        "partId": "JHD"
                    }
                },
                {
                    "name": "M3 bolt",
                    "description": "",
                    "material": "Steel",
                    "quantity": 8,
                    "itemSource": {
                        "fullConfiguration": "length=10",
                        "documentId": "lib",
                        "elementId": "ps2",
                        "wvmType": "v",
                        "wvmId": "v7",
                        "partId": "JFD"
                    }
                }
            ]
        }
    })
}

#[tokio::test]
async fn fetch_bom_parses_table() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("GET", "/api/assemblies/d/d1/w/w1/e/a1/bom")
        .match_query(Matcher::Exact(
            "generateIfAbsent=true&multiLevel=true&indented=false".into(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(bom_payload().to_string())
        .create_async()
        .await;

    let client = client_for(&server);
    let table = client.fetch_bom("d1", "w1", "a1").await.unwrap();

    assert_eq!(table.len(), 2);
    let printable: Vec<_> = table.printable().map(|i| i.name.as_str()).collect();
    assert_eq!(printable, ["Bracket"]);
    assert_eq!(table.items()[1].source.revision_type, RevisionType::Version);
    mock.assert_async().await;
}

#[tokio::test]
async fn fetch_bom_rejects_raw_response() {
    let mut server = Server::new_async().await;

    let _mock = server
        .mock("GET", "/api/assemblies/d/d1/w/w1/e/a1/bom")
        .match_query(Matcher::Any)
        .with_status(403)
        .with_header("content-type", "application/json")
        .with_body(r#"{"message": "forbidden"}"#)
        .create_async()
        .await;

    let client = client_for(&server);
    let err = client.fetch_bom("d1", "w1", "a1").await.unwrap_err();

    assert!(matches!(err, ClientError::UnexpectedResponse(_)));
    assert!(err.to_string().contains("forbidden"));
}

#[tokio::test]
async fn fetch_bom_reports_malformed_items() {
    let mut server = Server::new_async().await;
    let mut payload = bom_payload();
    payload["bomTable"]["items"][1]["itemSource"]
        .as_object_mut()
        .unwrap()
        .remove("documentId");

    let _mock = server
        .mock("GET", "/api/assemblies/d/d1/w/w1/e/a1/bom")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(payload.to_string())
        .create_async()
        .await;

    let client = client_for(&server);
    let err = client.fetch_bom("d1", "w1", "a1").await.unwrap_err();

    match err {
        ClientError::Bom(e) => {
            assert_eq!(e.index, Some(1));
            assert_eq!(e.field, "itemSource.documentId");
        }
        other => panic!("expected BOM error, got {other:?}"),
    }
}

#[tokio::test]
async fn export_item_follows_redirect_to_stl() {
    let mut server = Server::new_async().await;
    let location = format!(
        "{}/api/partstudios/d/d1/w/w1/e/ps1/stl?mode=binary&partIds=JHD&grouping=false&units=millimeter&configuration=default&rel=1",
        server.url()
    );
    let stl = vec![0u8; 84];

    let export = server
        .mock("GET", "/api/partstudios/d/d1/w/w1/e/ps1/stl")
        .match_query(Matcher::Exact(
            "mode=binary&partIds=JHD&grouping=false&units=millimeter&configuration=default".into(),
        ))
        .with_status(307)
        .with_header("location", &location)
        .create_async()
        .await;
    let download = server
        .mock("GET", "/api/partstudios/d/d1/w/w1/e/ps1/stl")
        .match_query(Matcher::UrlEncoded("rel".into(), "1".into()))
        .with_status(200)
        .with_header("content-type", "application/octet-stream")
        .with_body(stl.clone())
        .create_async()
        .await;

    let client = client_for(&server);
    let table = onshape_exporter_bom::parse_bom(&bom_payload()).unwrap();
    let response = client.export_item(&table.items()[0].source).await.unwrap();

    assert_eq!(response, ApiResponse::Raw(stl));
    export.assert_async().await;
    download.assert_async().await;
}

#[tokio::test]
async fn export_part_uses_revision_segment() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("GET", "/api/partstudios/d/d1/m/m9/e/ps1/stl")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("partIds".into(), "JHD".into()),
            Matcher::UrlEncoded("configuration".into(), "size=2 in".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/octet-stream")
        .with_body("solid")
        .create_async()
        .await;

    let client = client_for(&server);
    let response = client
        .export_part("d1", RevisionType::Microversion, "m9", "ps1", "JHD", "size=2 in")
        .await
        .unwrap();

    assert_eq!(response.as_bytes(), Some(&b"solid"[..]));
    mock.assert_async().await;
}

#[tokio::test]
async fn shaded_view_query() {
    let mut server = Server::new_async().await;
    let images = json!({"images": ["iVBORw0KGgo="]});

    let mock = server
        .mock("GET", "/api/assemblies/d/d1/w/w1/e/a1/shadedviews")
        .match_query(Matcher::Exact(
            "viewMatrix=trimetric&outputHeight=600&outputWidth=400&showAllParts=true&useAntiAliasing=true&pixelSize=0"
                .into(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(images.to_string())
        .create_async()
        .await;

    let client = client_for(&server);
    let options = ShadedViewOptions {
        output_height: 600,
        output_width: 400,
    };
    let response = client
        .get_shaded_view("d1", "w1", "a1", options)
        .await
        .unwrap();

    assert_eq!(response.into_json(), Some(images));
    mock.assert_async().await;
}
