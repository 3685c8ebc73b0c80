use rocket::{get, http::Status, post, serde::json::Json, Orbit, Rocket};
use serde::{Deserialize, Serialize};

use crate::pipelines::text_classification::inference::Prediction;

use super::SharedPredictor;

/// Liveness response
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Health {
    /// Always "ok" while the process serves requests
    pub status: String,
}

/// A text to classify
#[derive(Debug, Serialize, Deserialize)]
pub struct PredictRequest {
    /// The text
    pub text: String,
}

/// Error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// What went wrong
    pub error: String,
}

/// Report liveness, whether or not a predictor is loaded
#[get("/healthz")]
pub fn healthz() -> Json<Health> {
    Json(Health {
        status: "ok".to_string(),
    })
}

fn failure(status: Status, error: String) -> (Status, Json<ErrorResponse>) {
    (status, Json(ErrorResponse { error }))
}

/// Classify one text
///
/// The predictor is looked up on the running instance: a `&State` guard would abort launch when
/// none is managed. The forward pass runs on the blocking pool.
#[post("/predict", data = "<request>")]
pub async fn predict(
    request: Json<PredictRequest>,
    rocket: &Rocket<Orbit>,
) -> Result<Json<Prediction>, (Status, Json<ErrorResponse>)> {
    let Some(predictor) = rocket.state::<SharedPredictor>().cloned() else {
        return Err(failure(
            Status::ServiceUnavailable,
            "model not loaded".to_string(),
        ));
    };

    let text = request.into_inner().text;

    match rocket::tokio::task::spawn_blocking(move || predictor.predict(&text)).await {
        Ok(Ok(prediction)) => Ok(Json(prediction)),
        Ok(Err(e)) => {
            log::error!("Prediction failed: {:#}", e);

            Err(failure(Status::InternalServerError, e.to_string()))
        }
        Err(e) => {
            log::error!("Prediction task failed: {}", e);

            Err(failure(Status::InternalServerError, e.to_string()))
        }
    }
}
