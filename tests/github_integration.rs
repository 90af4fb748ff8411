//! Integration tests for the GitHub backend against a local HTTP server.

use regex::Regex;
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use forgework::forge::github::GithubService;
use forgework::forge::{CommentFilter, ForgeError, GitService, MatchSource, PrStatus};

fn service(server: &MockServer) -> GithubService {
    GithubService::new(Some("abc".into())).with_api_base(server.uri())
}

fn comment_json(id: u64, login: &str, body: &str) -> Value {
    json!({
        "id": id,
        "user": { "login": login },
        "body": body,
        "created_at": format!("2024-01-01T00:{:02}:00Z", id % 60),
        "updated_at": format!("2024-01-01T00:{:02}:00Z", id % 60),
    })
}

fn pr_json(number: u64, body: Option<&str>) -> Value {
    json!({
        "number": number,
        "title": "Add feature",
        "body": body,
        "user": { "login": "alice" },
        "state": "open",
        "merged": false,
        "merged_at": null,
        "html_url": format!("https://github.com/packit/ogr/pull/{}", number),
        "head": { "ref": "feature" },
        "base": { "ref": "main" },
    })
}

async fn mount_thread(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/repos/packit/ogr/issues/1/comments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            comment_json(1, "alice", "first bug report"),
            comment_json(2, "bob", "LGTM"),
            comment_json(3, "alice", "second bug report"),
        ])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/repos/packit/ogr/pulls/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(pr_json(1, Some("Fixes #42"))))
        .mount(server)
        .await;
}

mod comments {
    use super::*;

    #[tokio::test]
    async fn follows_pages_until_short_page() {
        let server = MockServer::start().await;
        let first: Vec<Value> = (1..=100).map(|i| comment_json(i, "bot", "ping")).collect();

        Mock::given(method("GET"))
            .and(path("/repos/packit/ogr/issues/5/comments"))
            .and(query_param("page", "1"))
            .and(query_param("per_page", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(Value::Array(first)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/packit/ogr/issues/5/comments"))
            .and(query_param("page", "2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([comment_json(101, "alice", "last one")])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let project = service(&server).get_project("packit", "ogr");
        let comments = project.get_all_pr_comments(5).await.unwrap();

        assert_eq!(comments.len(), 101);
        assert_eq!(comments[0].id, 1);
        assert_eq!(comments[100].author, "alice");
    }

    #[tokio::test]
    async fn filter_and_reverse() {
        let server = MockServer::start().await;
        mount_thread(&server).await;

        let project = service(&server).get_project("packit", "ogr");
        let filter = CommentFilter::new()
            .pattern("bug")
            .unwrap()
            .author("alice")
            .reversed(true);
        let comments = project.get_pr_comments(1, &filter).await.unwrap();

        let ids: Vec<u64> = comments.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![3, 1]);
    }

    #[tokio::test]
    async fn sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/o/r/issues/2/comments"))
            .and(header("authorization", "Bearer abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let project = service(&server).get_project("o", "r");
        assert!(project.get_all_issue_comments(2).await.unwrap().is_empty());
    }
}

mod search_in_pr {
    use super::*;

    #[tokio::test]
    async fn description_searched_first() {
        let server = MockServer::start().await;
        mount_thread(&server).await;

        let project = service(&server).get_project("packit", "ogr");
        let pattern = Regex::new(r"#(\d+)|bug").unwrap();
        let found = project
            .search_in_pr(1, &pattern, false, true)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(found.source, MatchSource::Description);
        assert_eq!(found.group(1), Some("42"));
    }

    #[tokio::test]
    async fn description_searched_last_when_reversed() {
        let server = MockServer::start().await;
        mount_thread(&server).await;

        let project = service(&server).get_project("packit", "ogr");
        let pattern = Regex::new(r"#(\d+)|bug").unwrap();
        let found = project
            .search_in_pr(1, &pattern, true, true)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            found.source,
            MatchSource::Comment {
                id: 3,
                author: "alice".into()
            }
        );
    }

    #[tokio::test]
    async fn reversed_search_reaches_description() {
        let server = MockServer::start().await;
        mount_thread(&server).await;

        let project = service(&server).get_project("packit", "ogr");
        let pattern = Regex::new("Fixes").unwrap();
        let found = project
            .search_in_pr(1, &pattern, true, true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.source, MatchSource::Description);
    }

    #[tokio::test]
    async fn reversed_search_prefers_oldest_comment_over_description() {
        let server = MockServer::start().await;
        mount_thread(&server).await;

        let project = service(&server).get_project("packit", "ogr");
        let pattern = Regex::new("first bug|Fixes").unwrap();
        let found = project
            .search_in_pr(1, &pattern, true, true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            found.source,
            MatchSource::Comment {
                id: 1,
                author: "alice".into()
            }
        );
    }

    #[tokio::test]
    async fn without_description_no_pr_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/packit/ogr/issues/1/comments"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([comment_json(1, "bob", "LGTM")])),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/packit/ogr/pulls/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(pr_json(1, Some("Fixes #1"))))
            .expect(0)
            .mount(&server)
            .await;

        let project = service(&server).get_project("packit", "ogr");
        let pattern = Regex::new("Fixes").unwrap();
        assert!(project
            .search_in_pr(1, &pattern, false, false)
            .await
            .unwrap()
            .is_none());
    }
}

mod pr_info {
    use super::*;

    #[tokio::test]
    async fn maps_fields() {
        let server = MockServer::start().await;
        mount_thread(&server).await;

        let info = service(&server)
            .get_project("packit", "ogr")
            .get_pr_info(1)
            .await
            .unwrap();
        assert_eq!(info.id, 1);
        assert_eq!(info.status, PrStatus::Open);
        assert_eq!(info.description.as_deref(), Some("Fixes #42"));
        assert_eq!(info.source_branch, "feature");
    }

    #[tokio::test]
    async fn missing_pr_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/packit/ogr/pulls/999"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "message": "Not Found" })))
            .mount(&server)
            .await;

        let result = service(&server).get_project("packit", "ogr").get_pr_info(999).await;
        assert!(matches!(result, Err(ForgeError::NotFound(m)) if m == "Not Found"));
    }
}

mod project_create {
    use super::*;

    fn repo_json(owner: &str, name: &str) -> Value {
        json!({
            "name": name,
            "html_url": format!("https://github.com/{}/{}", owner, name),
            "owner": { "login": owner },
        })
    }

    #[tokio::test]
    async fn missing_organization() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/orgs/nope"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "message": "Not Found" })))
            .mount(&server)
            .await;

        let err = service(&server)
            .project_create("tool", Some("nope"))
            .await
            .unwrap_err();
        assert!(matches!(&err, ForgeError::GithubApi(m) if m == "Group nope not found."));
    }

    #[tokio::test]
    async fn in_organization() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/orgs/packit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "login": "packit" })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/orgs/packit/repos"))
            .and(body_partial_json(json!({ "name": "tool" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(repo_json("packit", "tool")))
            .expect(1)
            .mount(&server)
            .await;

        let project = service(&server)
            .project_create("tool", Some("packit"))
            .await
            .unwrap();
        assert_eq!(project.full_repo_name(), "packit/tool");
    }

    #[tokio::test]
    async fn in_user_namespace() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/user/repos"))
            .respond_with(ResponseTemplate::new(201).set_body_json(repo_json("me", "tool")))
            .expect(1)
            .mount(&server)
            .await;

        let project = service(&server).project_create("tool", None).await.unwrap();
        assert_eq!(project.full_repo_name(), "me/tool");
    }
}

mod user {
    use super::*;

    #[tokio::test]
    async fn username_and_fork_project() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "login": "forker" })))
            .mount(&server)
            .await;

        let service = service(&server);
        assert_eq!(service.user().get_username().await.unwrap(), "forker");

        let fork = service.get_fork_project("ogr").await.unwrap();
        assert_eq!(fork.full_repo_name(), "forker/ogr");
    }

    #[tokio::test]
    async fn changed_token_is_used_by_existing_objects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .and(header("authorization", "Bearer new-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "login": "someone" })))
            .expect(1)
            .mount(&server)
            .await;

        let service = service(&server);
        let user = service.user();
        service.change_token("new-token");
        assert_eq!(user.get_username().await.unwrap(), "someone");
    }

    #[tokio::test]
    async fn error_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "Bad credentials" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/o/r/issues/1/comments"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let service = service(&server);
        assert!(matches!(
            service.user().get_username().await,
            Err(ForgeError::AuthFailed(_))
        ));
        assert!(matches!(
            service.get_project("o", "r").get_all_pr_comments(1).await,
            Err(ForgeError::RateLimited)
        ));
    }
}
