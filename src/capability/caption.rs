use super::hub::{HubClient, ModelSession};
use super::{preprocess, Capability, LoadCell};
use crate::error::CapabilityError;
use crate::model::{Caption, CapabilityInfo, ImageSource, Prediction, TaskInput, TaskKind};
use anyhow::{Context, Result};
use serde_json::Value;

pub(crate) struct ImageCaptioner {
    hub: HubClient,
    model_name: String,
    session: LoadCell<ModelSession>,
}

impl ImageCaptioner {
    pub fn new(hub: HubClient, model_name: String) -> Self {
        Self {
            hub,
            model_name,
            session: LoadCell::new(),
        }
    }

    fn session(&self) -> Result<ModelSession> {
        self.session.get_or_try_init(|| {
            tracing::info!(model = %self.model_name, "loading image caption model");
            self.hub.connect(&self.model_name)
        })
    }
}

impl Capability for ImageCaptioner {
    fn id(&self) -> TaskKind {
        TaskKind::ImageCaption
    }

    fn load(&self) -> Result<()> {
        self.session().map(|_| ())
    }

    fn process(&self, input: &TaskInput) -> Result<Prediction> {
        let TaskInput::Image(source) = input else {
            return Err(CapabilityError::InputMismatch {
                capability: self.id(),
                got: "text",
            }
            .into());
        };
        let session = self.session()?;

        let raw = read_source(source)?;
        let png = preprocess::normalize_to_rgb_png(&raw)?;
        let body = session.post_bytes(png, "image/png")?;
        parse_captions(body)
    }

    fn info(&self) -> CapabilityInfo {
        CapabilityInfo {
            model_name: self.model_name.clone(),
            loaded: self.session.is_loaded(),
            last_time: None,
        }
    }
}

pub(crate) fn read_source(source: &ImageSource) -> Result<Vec<u8>> {
    match source {
        ImageSource::Path(p) => {
            std::fs::read(p).with_context(|| format!("read image {}", p.display()))
        }
        ImageSource::Bytes(b) => Ok(b.to_vec()),
    }
}

fn parse_captions(body: Value) -> Result<Prediction> {
    // Some deployments return a bare object instead of a one-element list.
    let body = match body {
        Value::Object(_) => Value::Array(vec![body]),
        other => other,
    };
    let captions: Vec<Caption> = serde_json::from_value(body)
        .map_err(|e| CapabilityError::Decode(format!("caption list: {e}")))?;
    if captions.is_empty() {
        return Err(CapabilityError::Decode("no caption generated".into()).into());
    }
    Ok(Prediction::Captions(captions))
}
