//! Pipeline behavior over the wire: binding, filters, JSONP, faults.

#[cfg(test)]
mod tests {
    use resthost_core::HostConfig;
    use serde_json::{Value, json};

    use crate::{spawn_host, spawn_host_with};

    #[tokio::test]
    async fn test_should_merge_body_query_and_path_with_precedence() {
        let th = spawn_host().await;

        // Path variable beats the same-named query value and body field.
        let resp = th
            .client
            .get(th.url("/users/7?id=999&expand=posts"))
            .send()
            .await
            .unwrap();
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["id"], "7");
        assert_eq!(body["expand"], "posts");

        // Query beats body; untouched body fields survive.
        let resp = th
            .client
            .post(th.url("/echo?src=query"))
            .json(&json!({"src": "body", "keep": 1}))
            .send()
            .await
            .unwrap();
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["src"], "query");
        assert_eq!(body["keep"], 1);

        th.dispose().await;
    }

    #[tokio::test]
    async fn test_should_halt_pipeline_from_pre_request_filter() {
        let th = spawn_host().await;

        // The filter answers before routing; /nope would otherwise 404.
        let resp = th
            .client
            .get(th.url("/nope"))
            .header("x-short-circuit", "1")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 403);
        assert_eq!(resp.headers().get("content-type").unwrap(), "text/plain");
        assert_eq!(resp.text().await.unwrap(), "short-circuited");

        th.dispose().await;
    }

    #[tokio::test]
    async fn test_should_wrap_jsonp_callback() {
        let th = spawn_host().await;

        let resp = th
            .client
            .get(th.url("/users/7?callback=cb"))
            .send()
            .await
            .unwrap();
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            "application/javascript"
        );
        let body = resp.text().await.unwrap();
        assert!(body.starts_with("cb("), "body: {body}");
        assert!(body.ends_with(')'), "body: {body}");

        let inner: Value =
            serde_json::from_str(&body[3..body.len() - 1]).expect("payload inside callback");
        assert_eq!(inner["id"], "7");

        th.dispose().await;
    }

    #[tokio::test]
    async fn test_should_not_wrap_raw_payloads_in_jsonp() {
        let th = spawn_host().await;

        let resp = th
            .client
            .get(th.url("/raw?callback=cb"))
            .send()
            .await
            .unwrap();
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            "application/octet-stream"
        );
        let body = resp.bytes().await.unwrap();
        assert_eq!(&body[..], b"\x00\x01binary");

        th.dispose().await;
    }

    #[tokio::test]
    async fn test_should_skip_jsonp_when_disabled() {
        let config = HostConfig {
            allow_jsonp: false,
            ..HostConfig::default()
        };
        let th = spawn_host_with(config, "").await;

        let resp = th
            .client
            .get(th.url("/users/7?callback=cb"))
            .send()
            .await
            .unwrap();
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            "application/json"
        );

        th.dispose().await;
    }

    #[tokio::test]
    async fn test_should_convert_handler_fault_to_500_response() {
        let th = spawn_host().await;

        let resp = th.client.get(th.url("/fail")).send().await.unwrap();
        assert_eq!(resp.status(), 500);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["code"], "HandlerFault");
        assert_eq!(body["error"]["message"], "handler fault: intentional failure");

        th.dispose().await;
    }

    #[tokio::test]
    async fn test_should_reject_malformed_body_with_400() {
        let th = spawn_host().await;

        let resp = th
            .client
            .post(th.url("/echo"))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["code"], "BindingFailure");

        th.dispose().await;
    }

    #[tokio::test]
    async fn test_should_dump_raw_response_when_debug_mode_enabled() {
        let config = HostConfig {
            debug_mode: true,
            ..HostConfig::default()
        };
        let th = spawn_host_with(config, "").await;

        // The dump bypasses the xml extension negotiation.
        let resp = th
            .client
            .get(th.url("/users/7.xml?debug"))
            .send()
            .await
            .unwrap();
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            "application/json"
        );
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["id"], "7");

        th.dispose().await;
    }

    #[tokio::test]
    async fn test_should_ignore_debug_flag_when_debug_mode_disabled() {
        let th = spawn_host().await;

        let resp = th
            .client
            .get(th.url("/users/7.xml?debug"))
            .send()
            .await
            .unwrap();
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            "application/xml"
        );

        th.dispose().await;
    }
}
