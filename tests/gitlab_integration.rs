//! Integration tests for the GitLab backend against a local HTTP server.

use regex::Regex;
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use forgework::forge::gitlab::GitlabService;
use forgework::forge::{CommentFilter, ForgeError, GitService, MatchSource, PrStatus};

fn service(server: &MockServer) -> GitlabService {
    GitlabService::new(Some("glpat".into())).with_api_base(format!("{}/api/v4", server.uri()))
}

async fn mount_auth(server: &MockServer, username: &str) {
    Mock::given(method("GET"))
        .and(path("/api/v4/user"))
        .and(header("PRIVATE-TOKEN", "glpat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "username": username })))
        .mount(server)
        .await;
}

fn note_json(id: u64, username: &str, body: &str) -> Value {
    json!({
        "id": id,
        "body": body,
        "author": { "username": username },
        "created_at": format!("2024-02-01T10:{:02}:00Z", id % 60),
        "updated_at": format!("2024-02-01T10:{:02}:00Z", id % 60),
        "system": false,
    })
}

async fn mount_merge_request(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/group%2Fsub%2Fproject/merge_requests/4/notes"))
        .and(query_param("sort", "asc"))
        .and(query_param("order_by", "created_at"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            note_json(1, "carol", "please rebase"),
            note_json(2, "dave", "/packit test"),
            note_json(3, "carol", "/packit build"),
        ])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v4/projects/group%2Fsub%2Fproject/merge_requests/4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "iid": 4,
            "title": "Rebase",
            "description": "Closes #9",
            "author": { "username": "carol" },
            "state": "merged",
            "web_url": "https://gitlab.com/group/sub/project/-/merge_requests/4",
            "source_branch": "rebase",
            "target_branch": "main",
        })))
        .mount(server)
        .await;
}

mod connection {
    use super::*;

    #[tokio::test]
    async fn authenticates_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "username": "me" })))
            .expect(1)
            .mount(&server)
            .await;

        let service = service(&server);
        assert!(!service.is_connected());

        let first = service.connection().await.unwrap();
        let second = service.connection().await.unwrap();
        assert!(service.is_connected());
        assert_eq!(first.username(), Some("me"));
        assert!(std::sync::Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn change_token_reconnects() {
        let server = MockServer::start().await;
        mount_auth(&server, "me").await;
        Mock::given(method("GET"))
            .and(path("/api/v4/user"))
            .and(header("PRIVATE-TOKEN", "other"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "username": "them" })))
            .expect(1)
            .mount(&server)
            .await;

        let service = service(&server);
        let user = service.user();
        assert_eq!(user.get_username().await.unwrap(), "me");

        service.change_token("other");
        assert!(!service.is_connected());
        assert_eq!(user.get_username().await.unwrap(), "them");
    }

    #[tokio::test]
    async fn rejected_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/user"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "401 Unauthorized" })))
            .mount(&server)
            .await;

        let service = service(&server);
        assert!(matches!(
            service.connection().await,
            Err(ForgeError::AuthFailed(_))
        ));
        assert!(!service.is_connected());
    }
}

mod comments {
    use super::*;

    #[tokio::test]
    async fn nested_group_notes_filtered() {
        let server = MockServer::start().await;
        mount_auth(&server, "me").await;
        mount_merge_request(&server).await;

        let project = service(&server).get_project("group/sub", "project");
        let filter = CommentFilter::new().pattern("^/packit").unwrap().reversed(true);
        let comments = project.get_pr_comments(4, &filter).await.unwrap();

        let bodies: Vec<&str> = comments.iter().map(|c| c.body.as_str()).collect();
        assert_eq!(bodies, vec!["/packit build", "/packit test"]);
    }

    #[tokio::test]
    async fn issue_notes() {
        let server = MockServer::start().await;
        mount_auth(&server, "me").await;
        Mock::given(method("GET"))
            .and(path("/api/v4/projects/g%2Fp/issues/2/notes"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([note_json(7, "erin", "same here")])),
            )
            .mount(&server)
            .await;

        let comments = service(&server)
            .get_project("g", "p")
            .get_all_issue_comments(2)
            .await
            .unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].author, "erin");
    }

    #[tokio::test]
    async fn search_and_info() {
        let server = MockServer::start().await;
        mount_auth(&server, "me").await;
        mount_merge_request(&server).await;

        let project = service(&server).get_project("group/sub", "project");

        let info = project.get_pr_info(4).await.unwrap();
        assert_eq!(info.status, PrStatus::Merged);
        assert_eq!(info.author, "carol");

        let pattern = Regex::new(r"#(\d+)|/packit (\w+)").unwrap();
        let forward = project
            .search_in_pr(4, &pattern, false, true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(forward.source, MatchSource::Description);
        assert_eq!(forward.group(1), Some("9"));

        let backward = project
            .search_in_pr(4, &pattern, true, true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(backward.group(2), Some("build"));
    }

    #[tokio::test]
    async fn reversed_search_ends_with_description() {
        let server = MockServer::start().await;
        mount_auth(&server, "me").await;
        mount_merge_request(&server).await;

        let project = service(&server).get_project("group/sub", "project");

        let only_description = Regex::new("Closes").unwrap();
        let found = project
            .search_in_pr(4, &only_description, true, true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.source, MatchSource::Description);

        let both = Regex::new("please rebase|Closes").unwrap();
        let found = project
            .search_in_pr(4, &both, true, true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            found.source,
            MatchSource::Comment {
                id: 1,
                author: "carol".into()
            }
        );
    }
}

mod project_create {
    use super::*;

    fn project_json(namespace: &str, path_name: &str) -> Value {
        json!({
            "path": path_name,
            "web_url": format!("https://gitlab.com/{}/{}", namespace, path_name),
            "namespace": { "full_path": namespace },
        })
    }

    #[tokio::test]
    async fn missing_group() {
        let server = MockServer::start().await;
        mount_auth(&server, "me").await;
        Mock::given(method("GET"))
            .and(path("/api/v4/groups/nope"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({ "message": "404 Group Not Found" })),
            )
            .mount(&server)
            .await;

        let err = service(&server)
            .project_create("tool", Some("nope"))
            .await
            .unwrap_err();
        assert!(matches!(&err, ForgeError::GitlabApi(m) if m == "Group nope not found."));
    }

    #[tokio::test]
    async fn in_group() {
        let server = MockServer::start().await;
        mount_auth(&server, "me").await;
        Mock::given(method("GET"))
            .and(path("/api/v4/groups/team%2Fsub"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 77 })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v4/projects"))
            .and(body_partial_json(json!({ "name": "tool", "namespace_id": 77 })))
            .respond_with(ResponseTemplate::new(201).set_body_json(project_json("team/sub", "tool")))
            .expect(1)
            .mount(&server)
            .await;

        let project = service(&server)
            .project_create("tool", Some("team/sub"))
            .await
            .unwrap();
        assert_eq!(project.full_repo_name(), "team/sub/tool");
    }

    #[tokio::test]
    async fn in_user_namespace_uses_reported_path() {
        let server = MockServer::start().await;
        mount_auth(&server, "me").await;
        Mock::given(method("POST"))
            .and(path("/api/v4/projects"))
            .respond_with(ResponseTemplate::new(201).set_body_json(project_json("me", "tool")))
            .expect(1)
            .mount(&server)
            .await;

        let project = service(&server).project_create("tool", None).await.unwrap();
        assert_eq!(project.namespace(), "me");
        assert_eq!(project.repo(), "tool");
    }

    #[tokio::test]
    async fn validation_error() {
        let server = MockServer::start().await;
        mount_auth(&server, "me").await;
        Mock::given(method("POST"))
            .and(path("/api/v4/projects"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "message": { "name": ["has already been taken"] }
            })))
            .mount(&server)
            .await;

        let err = service(&server).project_create("tool", None).await.unwrap_err();
        match err {
            ForgeError::ApiError { status, message } => {
                assert_eq!(status, 400);
                assert!(message.contains("has already been taken"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
