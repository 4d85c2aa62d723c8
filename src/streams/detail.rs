use axum::{Json, debug_handler, extract::{Path, State}, response::{IntoResponse, Response}};

use crate::{AppResult, Store, db::StreamId, queries, res};

#[debug_handler(state = crate::AppState)]
pub(crate) async fn stream_detail(
    Path(stream_id): Path<StreamId>,
    State(store): State<Store>,
) -> AppResult<Response> {
    let Some(detail) = queries::stream_detail(&store, stream_id).await? else {
        return res::sorry("Stream");
    };

    Ok(Json(detail).into_response())
}
