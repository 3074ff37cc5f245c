use axum::http::{Method, StatusCode};
use tower::ServiceExt;

use crate::db::types::BatchJobStatus;
use crate::services::batch_provider::{PollOutcome, ResultItem, ResultLocation};
use crate::test_support::{json_request, output, read_json, setup_test_context, TestContext};

fn seed_book_with_images(ctx: &TestContext, book_id: &str, pages: i32) -> Vec<String> {
    let ids = ctx.store.seed_book(book_id, "latin", pages);
    for number in 1..=pages {
        ctx.images.insert(&format!("pages/{book_id}/{number}.jpg"), b"jpeg");
    }
    ids
}

#[tokio::test]
async fn process_submits_and_then_reconciles() {
    let ctx = setup_test_context(None).await;
    let ids = seed_book_with_images(&ctx, "b1", 2);

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(Method::POST, "/api/v1/batch/process", None, None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let json = read_json(response).await;
    assert_eq!(json["new_jobs_queued"], 1);
    assert_eq!(json["jobs_checked"], 0);

    ctx.provider.script_poll(
        "batches/1",
        PollOutcome {
            state: "JOB_STATE_SUCCEEDED".to_string(),
            results: Some(ResultLocation::Inline(
                ids.iter()
                    .map(|id| ResultItem { key: id.clone(), outcome: Ok(output("text")) })
                    .collect(),
            )),
            error: None,
        },
    );
    let response = ctx
        .app
        .oneshot(json_request(
            Method::GET,
            "/api/v1/batch/process?skip_new_work=true",
            None,
            None,
        ))
        .await
        .expect("response");
    let json = read_json(response).await;
    assert_eq!(json["jobs_completed"], 1);
    assert_eq!(json["pages_reconciled"], 2);
    assert_eq!(json["details"][0]["status"], "saved");
    assert_eq!(json["errors"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn process_fails_with_500_when_the_store_is_down() {
    let ctx = setup_test_context(None).await;
    ctx.store.set_unavailable(true);

    let response = ctx
        .app
        .oneshot(json_request(Method::POST, "/api/v1/batch/process", None, None))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = read_json(response).await;
    assert_eq!(json["status"], 500);
}

#[tokio::test]
async fn jobs_can_be_listed_filtered_and_fetched() {
    let ctx = setup_test_context(None).await;
    seed_book_with_images(&ctx, "b1", 1);
    seed_book_with_images(&ctx, "b2", 1);
    ctx.app
        .clone()
        .oneshot(json_request(Method::POST, "/api/v1/batch/process", None, None))
        .await
        .expect("process");
    let job_id = ctx.store.jobs()[0].id.clone();

    let list = read_json(
        ctx.app
            .clone()
            .oneshot(json_request(Method::GET, "/api/v1/batch/jobs?status=pending", None, None))
            .await
            .expect("list"),
    )
    .await;
    assert_eq!(list.as_array().map(Vec::len), Some(2));

    let saved = read_json(
        ctx.app
            .clone()
            .oneshot(json_request(Method::GET, "/api/v1/batch/jobs?status=saved", None, None))
            .await
            .expect("list saved"),
    )
    .await;
    assert_eq!(saved.as_array().map(Vec::len), Some(0));

    let bad = ctx
        .app
        .clone()
        .oneshot(json_request(Method::GET, "/api/v1/batch/jobs?status=bogus", None, None))
        .await
        .expect("bad status");
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

    let one = read_json(
        ctx.app
            .clone()
            .oneshot(json_request(Method::GET, &format!("/api/v1/batch/jobs/{job_id}"), None, None))
            .await
            .expect("job"),
    )
    .await;
    assert_eq!(one["id"], job_id);
    assert_eq!(one["total_pages"], 1);

    let missing = ctx
        .app
        .oneshot(json_request(Method::GET, "/api/v1/batch/jobs/nope", None, None))
        .await
        .expect("missing");
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cancel_closes_an_active_job_once() {
    let ctx = setup_test_context(None).await;
    seed_book_with_images(&ctx, "b1", 1);
    ctx.app
        .clone()
        .oneshot(json_request(Method::POST, "/api/v1/batch/process", None, None))
        .await
        .expect("process");
    let job = ctx.store.jobs()[0].clone();
    let uri = format!("/api/v1/batch/jobs/{}/cancel", job.id);

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(Method::POST, &uri, None, None))
        .await
        .expect("cancel");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["status"], "cancelled");
    assert_eq!(ctx.provider.cancelled(), vec![job.remote_ref.clone()]);
    assert_eq!(ctx.store.jobs()[0].status, BatchJobStatus::Cancelled);

    let again = ctx.app.oneshot(json_request(Method::POST, &uri, None, None)).await.expect("again");
    assert_eq!(again.status(), StatusCode::CONFLICT);
}
