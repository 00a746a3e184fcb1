//! Route resolution over the wire: specificity, wildcards, extensions.

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use crate::spawn_host;

    #[tokio::test]
    async fn test_should_resolve_path_variables() {
        let th = spawn_host().await;

        let resp = th.client.get(th.url("/users/42")).send().await.unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["id"], "42");

        th.dispose().await;
    }

    #[tokio::test]
    async fn test_should_return_404_with_error_payload_for_unknown_route() {
        let th = spawn_host().await;

        let resp = th.client.get(th.url("/nope")).send().await.unwrap();
        assert_eq!(resp.status(), 404);
        assert!(resp.headers().get("x-request-id").is_some());
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["code"], "RouteNotFound");

        th.dispose().await;
    }

    #[tokio::test]
    async fn test_should_return_404_for_verb_mismatch() {
        let th = spawn_host().await;

        let resp = th.client.delete(th.url("/users/42")).send().await.unwrap();
        assert_eq!(resp.status(), 404);

        th.dispose().await;
    }

    #[tokio::test]
    async fn test_should_prefer_literal_over_variable_template() {
        let th = spawn_host().await;

        let resp = th.client.get(th.url("/a/fixed")).send().await.unwrap();
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["matched"], "fixed");

        let resp = th.client.get(th.url("/a/other")).send().await.unwrap();
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["matched"], "variable");

        th.dispose().await;
    }

    #[tokio::test]
    async fn test_should_match_wildcard_for_deep_paths() {
        let th = spawn_host().await;

        for path in ["/files", "/files/a", "/files/a/b/c"] {
            let resp = th.client.get(th.url(path)).send().await.unwrap();
            assert_eq!(resp.status(), 200, "path {path}");
            let body: Value = resp.json().await.unwrap();
            assert_eq!(body["matched"], "files");
        }

        th.dispose().await;
    }

    #[tokio::test]
    async fn test_should_strip_json_extension_and_keep_variable() {
        let th = spawn_host().await;

        let resp = th.client.get(th.url("/users/1.json")).send().await.unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            "application/json"
        );
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["id"], "1");

        th.dispose().await;
    }

    #[tokio::test]
    async fn test_should_serve_xml_via_route_extension() {
        let th = spawn_host().await;

        let resp = th.client.get(th.url("/users/1.xml")).send().await.unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            "application/xml"
        );
        let body = resp.text().await.unwrap();
        assert!(body.contains("<id>1</id>"), "body: {body}");

        th.dispose().await;
    }

    #[tokio::test]
    async fn test_should_keep_unrecognized_extension_in_captured_segment() {
        let th = spawn_host().await;

        let resp = th.client.get(th.url("/users/report.csv")).send().await.unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["id"], "report.csv");

        th.dispose().await;
    }
}
