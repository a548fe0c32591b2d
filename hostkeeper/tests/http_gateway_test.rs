//! HTTP gateway status classification against a mock server.

use hostkeeper::config::GatewayConfig;
use hostkeeper::{
    AccessToken, GatewayError, HostId, HttpGateway, Operation, RemoteGateway, RemoteResult,
    Service,
};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HOST: &str = "01234567-89AB-CDEF-0123-456789ABCDEF";
const FRIEND: &str = "11111111-AAAA-BBBB-CCCC-111111111111";

fn host() -> HostId {
    HOST.parse().unwrap()
}

fn token() -> AccessToken {
    AccessToken::new("t1")
}

async fn gateway(server: &MockServer) -> HttpGateway {
    HttpGateway::new(&GatewayConfig {
        base_url: server.uri(),
        ..Default::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_register_decodes_and_uppercases_profile() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hosts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "uuid": HOST.to_lowercase(),
            "only_friends": true,
            "allow_nonames": false,
            "friends": [FRIEND.to_lowercase()],
            "banlist": []
        })))
        .mount(&server)
        .await;

    let profile = gateway(&server).await.register().await.unwrap().ok().unwrap();
    assert_eq!(profile.host_id().to_string(), HOST);
    assert!(profile.only_friends());
    assert!(!profile.allow_nonames());
    assert_eq!(
        profile.friends().iter().map(HostId::to_string).collect::<Vec<_>>(),
        vec![FRIEND.to_string()]
    );
}

#[tokio::test]
async fn test_login_token_and_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/hosts/{}/access_token", HOST)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "abc" })))
        .mount(&server)
        .await;

    let gateway = gateway(&server).await;
    let result = gateway.login(host()).await.unwrap();
    assert_eq!(result, RemoteResult::Ok(AccessToken::new("abc")));

    // Any other host is unknown to the mock
    let result = gateway.login(HostId::random()).await.unwrap();
    assert_eq!(result, RemoteResult::NotFound);
}

#[tokio::test]
async fn test_login_unauthorized_is_a_defect() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = gateway(&server).await.login(host()).await.unwrap_err();
    assert!(matches!(
        err,
        GatewayError::UnexpectedStatus {
            operation: Operation::Login,
            status: 401
        }
    ));
}

#[tokio::test]
async fn test_register_not_found_is_a_defect() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = gateway(&server).await.register().await.unwrap_err();
    assert!(matches!(
        err,
        GatewayError::UnexpectedStatus {
            operation: Operation::Register,
            status: 404
        }
    ));
}

#[tokio::test]
async fn test_renew_sends_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hosts/access_token/renew"))
        .and(header("authorization", "Bearer t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "t2" })))
        .mount(&server)
        .await;

    let result = gateway(&server).await.renew(&token()).await.unwrap();
    assert_eq!(result, RemoteResult::Ok(AccessToken::new("t2")));
}

#[tokio::test]
async fn test_service_down_names_the_service() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hosts/access_token/renew"))
        .respond_with(ResponseTemplate::new(503).set_body_string("auth"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/hosts/{}", HOST)))
        .respond_with(ResponseTemplate::new(503).set_body_string("hosts"))
        .mount(&server)
        .await;

    let gateway = gateway(&server).await;
    assert_eq!(
        gateway.renew(&token()).await.unwrap(),
        RemoteResult::ServiceDown(Service::Auth)
    );
    assert_eq!(
        gateway.fetch_profile(host(), &token()).await.unwrap(),
        RemoteResult::ServiceDown(Service::Hosts)
    );
}

#[tokio::test]
async fn test_renew_classifies_hosts_outage() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hosts/access_token/renew"))
        .respond_with(ResponseTemplate::new(503).set_body_string("hosts"))
        .mount(&server)
        .await;

    assert_eq!(
        gateway(&server).await.renew(&token()).await.unwrap(),
        RemoteResult::ServiceDown(Service::Hosts)
    );
}

#[tokio::test]
async fn test_unknown_service_is_a_defect() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(503).set_body_string("database"))
        .mount(&server)
        .await;

    let err = gateway(&server)
        .await
        .set_only_friends(host(), &token(), true)
        .await
        .unwrap_err();
    match err {
        GatewayError::UnknownService { operation, body } => {
            assert_eq!(operation, Operation::SetOnlyFriends);
            assert_eq!(body, "database");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_authenticated_calls_classify_401_and_404() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(format!("/hosts/{}/allow_nonames", HOST)))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("/hosts/{}/friends/{}", HOST, FRIEND)))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let gateway = gateway(&server).await;
    let friend: HostId = FRIEND.parse().unwrap();

    assert_eq!(
        gateway.set_allow_nonames(host(), &token(), true).await.unwrap(),
        RemoteResult::Unauthorized
    );
    assert_eq!(
        gateway.remove_friend(host(), &token(), friend).await.unwrap(),
        RemoteResult::NotFound
    );
}

#[tokio::test]
async fn test_mutation_wire_format() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(format!("/hosts/{}/only_friends", HOST)))
        .and(header("authorization", "Bearer t1"))
        .and(body_json(json!({ "only_friends": false })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/hosts/{}/friends", HOST)))
        .and(query_param("friend", FRIEND))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/hosts/{}/banlist", HOST)))
        .and(query_param("banned", FRIEND))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("/hosts/{}/banlist/{}", HOST, FRIEND)))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway(&server).await;
    let friend: HostId = FRIEND.parse().unwrap();

    assert!(gateway.set_only_friends(host(), &token(), false).await.unwrap().is_ok());
    assert!(gateway.add_friend(host(), &token(), friend).await.unwrap().is_ok());
    assert!(gateway.add_ban(host(), &token(), friend).await.unwrap().is_ok());
    assert!(gateway.remove_ban(host(), &token(), friend).await.unwrap().is_ok());
}

#[tokio::test]
async fn test_unexpected_status_is_a_defect() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = gateway(&server)
        .await
        .fetch_profile(host(), &token())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GatewayError::UnexpectedStatus {
            operation: Operation::FetchProfile,
            status: 500
        }
    ));
}

#[tokio::test]
async fn test_malformed_body_is_a_defect() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/hosts/{}", HOST)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "uuid": "not-a-uuid",
            "only_friends": true,
            "allow_nonames": false,
            "friends": [],
            "banlist": []
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/hosts/access_token/renew"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .mount(&server)
        .await;

    let gateway = gateway(&server).await;
    assert!(matches!(
        gateway.fetch_profile(host(), &token()).await,
        Err(GatewayError::InvalidIdentifier { .. })
    ));
    assert!(matches!(
        gateway.renew(&token()).await,
        Err(GatewayError::Decode {
            operation: Operation::Renew,
            ..
        })
    ));
}
