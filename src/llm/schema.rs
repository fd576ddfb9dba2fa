//! JSON schemas handed to the model in strict structured-output mode.

use crate::types::ExpressSize;
use serde_json::{json, Value};

#[derive(Debug, Clone)]
pub struct OutputSchema {
    pub name: &'static str,
    pub schema: Value,
}

impl OutputSchema {
    /// `response_format` payload for the chat completions API
    pub fn response_format(&self) -> Value {
        json!({
            "type": "json_schema",
            "json_schema": {
                "name": self.name,
                "strict": true,
                "schema": self.schema,
            }
        })
    }
}

pub fn single() -> OutputSchema {
    OutputSchema {
        name: "single_prediction",
        schema: json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "type": { "type": "string", "const": "single" },
                "match": { "type": "string" },
                "prediction": { "type": "string" },
                "odds": { "type": "number", "minimum": 1.30, "maximum": 1.60 },
                "confidence": { "type": "integer", "minimum": 0, "maximum": 100 }
            },
            "required": ["type", "match", "prediction", "odds", "confidence"]
        }),
    }
}

pub fn express(size: ExpressSize) -> OutputSchema {
    let legs = size.legs();
    OutputSchema {
        name: match size {
            ExpressSize::Three => "express_prediction",
            ExpressSize::Five => "express5_prediction",
        },
        schema: json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "type": { "type": "string", "const": size.type_tag() },
                "bets": {
                    "type": "array",
                    "minItems": legs,
                    "maxItems": legs,
                    "items": {
                        "type": "object",
                        "additionalProperties": false,
                        "properties": {
                            "match": { "type": "string" },
                            "prediction": { "type": "string" },
                            "odds": { "type": "number", "minimum": 1.30, "maximum": 1.60 }
                        },
                        "required": ["match", "prediction", "odds"]
                    }
                },
                "total_odds": { "type": "number" },
                "confidence": { "type": "integer", "minimum": 0, "maximum": 100 }
            },
            "required": ["type", "bets", "total_odds", "confidence"]
        }),
    }
}

pub fn analysis() -> OutputSchema {
    OutputSchema {
        name: "match_analysis",
        schema: json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "match": { "type": "string" },
                "prediction": { "type": "string" },
                "riskPercent": { "type": "integer", "minimum": 0, "maximum": 100 },
                "odds": { "type": "number", "minimum": 1.0, "maximum": 10.0 }
            },
            "required": ["match", "prediction", "riskPercent", "odds"]
        }),
    }
}
