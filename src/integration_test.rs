#[cfg(test)]
mod tests {
    use anyhow::Result;
    use axum::{
        body::Body,
        http::{header, Method, StatusCode},
    };
    use serde_json::json;

    use crate::testing::{create_body, TestService, TEST_CREATE_KEY};

    async fn create_url(test_srv: &TestService, project: &str, version: &str, build: &str) -> Result<String> {
        let response = test_srv.create(create_body(project, version, build)).await?;
        assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
        Ok(response.json()["url"].as_str().unwrap().to_string())
    }

    #[tokio::test]
    async fn test_create_upload_browse_download() -> Result<()> {
        let test_srv = TestService::new().await?;

        let url = create_url(&test_srv, "app", "1.0", "abc").await?;
        assert_eq!(url, "/v2/create/upload/1");

        let response = test_srv.upload(&url, b"hello").await?;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.json(), json!({}));

        let response = test_srv.get("/v2/").await?;
        assert_eq!(response.json(), json!({"projects": ["app"]}));

        let response = test_srv.get("/v2/app").await?;
        assert_eq!(response.json(), json!({"project": "app", "versions": ["1.0"]}));

        let expected_build = json!({
            "project": "app",
            "version": "1.0",
            "build": "abc",
            "result": "SUCCESS",
            "timestamp": 1_700_000_000_000u64,
            "duration": 42,
            "md5": "5d41402abc4b2a76b9719d911017c592",
            "sha256": "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824",
            "sha512": "9b71d224bd62f3785d96d46ad3ea3d73319bfbc2890caadae2dff72519673ca72323c3d99ba5c11d7c7acc6e14b8c5da0c4663475c2e5c3adef46f73bcdec043",
            "commits": [{
                "author": "Ada",
                "email": "ada@example.com",
                "description": "Fix the build",
                "hash": "0123abcd",
                "timestamp": 1_699_999_999_000u64,
            }],
            "flags": ["nightly"],
        });

        let response = test_srv.get("/v2/app/1.0").await?;
        assert_eq!(
            response.json(),
            json!({
                "project": "app",
                "version": "1.0",
                "builds": {"latest": expected_build, "all": [expected_build]},
            })
        );

        let response = test_srv.get("/v2/app/1.0/abc").await?;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.json(), expected_build);

        let response = test_srv.get("/v2/app/1.0/abc/download").await?;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body.as_ref(), b"hello");
        assert_eq!(
            response.headers[header::CONTENT_TYPE],
            "application/octet-stream"
        );
        assert_eq!(response.headers[header::CONTENT_LENGTH], "5");
        assert_eq!(
            response.headers[header::CONTENT_DISPOSITION],
            "attachment; filename=\"app-1.0-abc.zip\""
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_create_conflicts() -> Result<()> {
        let test_srv = TestService::new().await?;
        create_url(&test_srv, "app", "1.0", "abc").await?;

        let response = test_srv.create(create_body("app", "1.0", "abc")).await?;
        assert_eq!(response.status, StatusCode::CONFLICT);
        assert_eq!(response.json(), json!({"error": "Build already exists"}));

        // Same label in another version is a different build.
        create_url(&test_srv, "app", "2.0", "abc").await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_create_requires_exact_key() -> Result<()> {
        let test_srv = TestService::new().await?;
        let body = create_body("app", "1.0", "abc").to_string();

        for authorization in [None, Some("wrong"), Some("Bearer test-key"), Some("test-key ")] {
            let response = test_srv
                .request(Method::POST, "/v2/create", authorization, body.clone())
                .await?;
            assert_eq!(response.status, StatusCode::UNAUTHORIZED, "{authorization:?}");
            assert_eq!(response.json(), json!({"error": "Unauthorized"}));
        }

        let response = test_srv
            .request(Method::POST, "/v2/create/upload/1", Some("wrong"), "hello")
            .await?;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);

        // Nothing was created by the rejected requests.
        let response = test_srv.get("/v2/").await?;
        assert_eq!(response.json(), json!({"projects": []}));
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_create_body() -> Result<()> {
        let test_srv = TestService::new().await?;

        let response = test_srv
            .request(Method::POST, "/v2/create", Some(TEST_CREATE_KEY), "not json")
            .await?;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.json(), json!({"error": "Invalid body"}));

        let mut body = create_body("app", "1.0", "abc");
        body.as_object_mut().unwrap().remove("commits");
        let response = test_srv.create(body).await?;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.json(), json!({"error": "Invalid body"}));

        let mut body = create_body("app", "1.0", "abc");
        body["fileExtension"] = json!("../zip");
        let response = test_srv.create(body).await?;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);

        let mut body = create_body("app", "1.0", "abc");
        body["project"] = json!("");
        let response = test_srv.create(body).await?;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);

        let response = test_srv.get("/v2/").await?;
        assert_eq!(response.json(), json!({"projects": []}));
        Ok(())
    }

    #[tokio::test]
    async fn test_upload_rejections() -> Result<()> {
        let test_srv = TestService::new().await?;

        for invalid in ["0", "abc", "-3"] {
            let response = test_srv
                .upload(&format!("/v2/create/upload/{invalid}"), b"hello")
                .await?;
            assert_eq!(response.status, StatusCode::BAD_REQUEST, "{invalid}");
            assert_eq!(response.json(), json!({"error": "Invalid build"}));
        }

        let response = test_srv.upload("/v2/create/upload/99", b"hello").await?;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.json(), json!({"error": "Build not found"}));

        let url = create_url(&test_srv, "app", "1.0", "abc").await?;
        assert_eq!(test_srv.upload(&url, b"hello").await?.status, StatusCode::OK);
        let response = test_srv.upload(&url, b"again").await?;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.json(), json!({"error": "Build not found"}));

        let response = test_srv.get("/v2/app/1.0/abc/download").await?;
        assert_eq!(response.body.as_ref(), b"hello");
        Ok(())
    }

    #[tokio::test]
    async fn test_upload_size_limit() -> Result<()> {
        let test_srv = TestService::with_config(|cfg| cfg.max_upload_bytes = 4).await?;
        let url = create_url(&test_srv, "app", "1.0", "abc").await?;

        let response = test_srv.upload(&url, b"hello").await?;
        assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(response.json()["error"].is_string());

        // The build stays pending and can still be uploaded to.
        let response = test_srv.upload(&url, b"hey").await?;
        assert_eq!(response.status, StatusCode::OK);
        Ok(())
    }

    #[tokio::test]
    async fn test_pending_builds_are_hidden() -> Result<()> {
        let test_srv = TestService::new().await?;
        create_url(&test_srv, "app", "1.0", "abc").await?;

        let response = test_srv.get("/v2/app/1.0").await?;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(
            response.json(),
            json!({
                "project": "app",
                "version": "1.0",
                "builds": {"latest": null, "all": []},
            })
        );

        for uri in ["/v2/app/1.0/abc", "/v2/app/1.0/abc/download"] {
            let response = test_srv.get(uri).await?;
            assert_eq!(response.status, StatusCode::NOT_FOUND, "{uri}");
            assert_eq!(response.json(), json!({"error": "Build not found"}));
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_latest_follows_creation_order() -> Result<()> {
        let test_srv = TestService::new().await?;
        let first = create_url(&test_srv, "app", "1.0", "first").await?;
        let second = create_url(&test_srv, "app", "1.0", "second").await?;
        test_srv.upload(&second, b"2").await?;
        test_srv.upload(&first, b"1").await?;

        let body = test_srv.get("/v2/app/1.0").await?.json();
        assert_eq!(body["builds"]["latest"]["build"], "second");
        let labels: Vec<&str> = body["builds"]["all"]
            .as_array()
            .unwrap()
            .iter()
            .map(|b| b["build"].as_str().unwrap())
            .collect();
        assert_eq!(labels, ["first", "second"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_not_found_messages() -> Result<()> {
        let test_srv = TestService::new().await?;
        let response = test_srv.get("/v2/nonexistent").await?;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.json(), json!({"error": "Project not found"}));

        create_url(&test_srv, "app", "1.0", "abc").await?;
        let response = test_srv.get("/v2/app/9.9").await?;
        assert_eq!(response.json(), json!({"error": "Version not found"}));
        let response = test_srv.get("/v2/app/9.9/abc").await?;
        assert_eq!(response.json(), json!({"error": "Version not found"}));

        let response = test_srv.get("/v2/app/1.0/abc/download/extra").await?;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.json(), json!({"error": "Route not found"}));
        let response = test_srv.get("/elsewhere").await?;
        assert_eq!(response.json(), json!({"error": "Route not found"}));
        Ok(())
    }

    #[tokio::test]
    async fn test_custom_api_prefix() -> Result<()> {
        let test_srv =
            TestService::with_config(|cfg| cfg.api_prefix = "/registry".to_string()).await?;
        let response = test_srv
            .request(
                Method::POST,
                "/registry/create",
                Some(TEST_CREATE_KEY),
                create_body("app", "1.0", "abc").to_string(),
            )
            .await?;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.json()["url"], "/registry/create/upload/1");

        let response = test_srv.get("/registry").await?;
        assert_eq!(response.json(), json!({"projects": ["app"]}));
        let response = test_srv.get("/v2/").await?;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        Ok(())
    }

    #[tokio::test]
    async fn test_docs_and_banner() -> Result<()> {
        let test_srv = TestService::new().await?;
        let response = test_srv.get("/docs/openapi.json").await?;
        assert_eq!(response.status, StatusCode::OK);
        assert!(response.json()["paths"]["/v2/create"].is_object());

        let response = test_srv
            .request(Method::GET, "/", None, Body::empty())
            .await?;
        assert_eq!(response.status, StatusCode::OK);
        assert!(String::from_utf8_lossy(&response.body).starts_with("Artifact Registry"));
        Ok(())
    }
}
