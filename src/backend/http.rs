use gloo_net::http::{Request, Response};
use serde::de::DeserializeOwned;
use wasm_bindgen::JsValue;

use crate::api::{
    AnalyzeResponse, ApiFuture, Backend, BatchDetail, BatchSummary, CartItem, CartSubmission,
    FileUpload, PriceRequest, PriceResponse, QuantityUpdate,
};
use crate::error::ApiError;
use crate::runtime;

impl From<gloo_net::Error> for ApiError {
    fn from(e: gloo_net::Error) -> Self {
        match e {
            gloo_net::Error::SerdeError(e) => ApiError::Decode(e.to_string()),
            other => ApiError::Transport(other.to_string()),
        }
    }
}

fn js_err(e: JsValue) -> ApiError {
    ApiError::Transport(format!("{e:?}"))
}

/// `fetch`-based client for the quoting service.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    base: String,
}

impl HttpBackend {
    pub fn new(base: &str) -> Self {
        Self { base: base.trim_end_matches('/').to_owned() }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }
}

fn file_form(file: &FileUpload) -> Result<web_sys::FormData, ApiError> {
    let array = js_sys::Uint8Array::from(&file.bytes[..]);
    let parts = js_sys::Array::of1(&array);
    let blob = web_sys::Blob::new_with_u8_array_sequence(&parts).map_err(js_err)?;
    let form = web_sys::FormData::new().map_err(js_err)?;
    form.append_with_blob_and_filename("file", &blob, &file.name).map_err(js_err)?;
    Ok(form)
}

async fn check(resp: Response) -> Result<Response, ApiError> {
    if resp.ok() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    Err(ApiError::Status { status, body })
}

async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T, ApiError> {
    let resp = check(resp).await?;
    resp.json::<T>().await.map_err(|e| ApiError::Decode(e.to_string()))
}

impl Backend for HttpBackend {
    fn analyze(&self, file: FileUpload) -> ApiFuture<AnalyzeResponse> {
        let url = self.url("/analyze-file");
        runtime::boxed(async move {
            let form = file_form(&file)?;
            let resp = Request::post(&url).body(form)?.send().await?;
            read_json(resp).await
        })
    }

    fn calculate_price(&self, request: PriceRequest) -> ApiFuture<PriceResponse> {
        let url = self.url("/calculate-price");
        runtime::boxed(async move {
            let resp = Request::post(&url).json(&request)?.send().await?;
            read_json(resp).await
        })
    }

    fn add_to_cart(&self, submission: CartSubmission) -> ApiFuture<()> {
        let url = self.url("/cart/add");
        runtime::boxed(async move {
            let form = file_form(&submission.file)?;
            let config = serde_json::to_string(&submission.config)
                .map_err(|e| ApiError::Decode(e.to_string()))?;
            form.append_with_str("config", &config).map_err(js_err)?;
            let resp = Request::post(&url).body(form)?.send().await?;
            check(resp).await.map(drop)
        })
    }

    fn list_cart(&self) -> ApiFuture<Vec<CartItem>> {
        let url = self.url("/cart");
        runtime::boxed(async move { read_json(Request::get(&url).send().await?).await })
    }

    fn update_quantity(&self, update: QuantityUpdate) -> ApiFuture<()> {
        let url = self.url("/cart/update-qty");
        runtime::boxed(async move {
            let resp = Request::post(&url).json(&update)?.send().await?;
            check(resp).await.map(drop)
        })
    }

    fn remove_item(&self, item_id: String) -> ApiFuture<()> {
        let url = self.url("/cart/delete");
        runtime::boxed(async move {
            let body = QuantityUpdate { item_id, quantity: 0 };
            let resp = Request::post(&url).json(&body)?.send().await?;
            check(resp).await.map(drop)
        })
    }

    fn launch_production(&self) -> ApiFuture<()> {
        let url = self.url("/production/launch");
        runtime::boxed(async move { check(Request::post(&url).send().await?).await.map(drop) })
    }

    fn list_batches(&self) -> ApiFuture<Vec<BatchSummary>> {
        let url = self.url("/admin/batches");
        runtime::boxed(async move { read_json(Request::get(&url).send().await?).await })
    }

    fn batch_detail(&self, batch_id: String) -> ApiFuture<BatchDetail> {
        let url = self.url(&format!("/admin/batch/{batch_id}"));
        runtime::boxed(async move { read_json(Request::get(&url).send().await?).await })
    }
}
