//! Content negotiation over the wire.

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use crate::spawn_host;

    #[tokio::test]
    async fn test_should_default_to_json() {
        let th = spawn_host().await;

        let resp = th.client.get(th.url("/status")).send().await.unwrap();
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            "application/json"
        );

        th.dispose().await;
    }

    #[tokio::test]
    async fn test_should_negotiate_xml_from_accept_header() {
        let th = spawn_host().await;

        let resp = th
            .client
            .get(th.url("/status"))
            .header("accept", "application/xml")
            .send()
            .await
            .unwrap();
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            "application/xml"
        );
        let body = resp.text().await.unwrap();
        assert!(body.contains("<status>running</status>"), "body: {body}");

        th.dispose().await;
    }

    #[tokio::test]
    async fn test_should_negotiate_via_format_query_param() {
        let th = spawn_host().await;

        let resp = th
            .client
            .get(th.url("/status?format=xml"))
            .send()
            .await
            .unwrap();
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            "application/xml"
        );

        th.dispose().await;
    }

    #[tokio::test]
    async fn test_should_reject_unsupported_accept_with_406() {
        let th = spawn_host().await;

        let resp = th
            .client
            .get(th.url("/status"))
            .header("accept", "text/csv")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 406);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["code"], "UnsupportedContentType");

        th.dispose().await;
    }

    #[tokio::test]
    async fn test_should_fall_back_to_default_for_wildcard_accept() {
        let th = spawn_host().await;

        let resp = th
            .client
            .get(th.url("/status"))
            .header("accept", "*/*")
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
    async fn test_should_accept_xml_request_bodies() {
        let th = spawn_host().await;

        let resp = th
            .client
            .post(th.url("/echo"))
            .header("content-type", "application/xml")
            .body("<request><name>ada</name></request>")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["name"], "ada");

        th.dispose().await;
    }
}
