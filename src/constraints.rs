use crate::error::AssignError;
use crate::models::{ConstraintDef, RawAnswer};

/// The single percentage-vs-ratio conversion point, shared by the
/// create and update paths so a stored ratio is never re-divided.
/// Input in (1, 100] is read as a percentage; [0, 1] is already a
/// ratio and stored as-is.
pub fn ratio_from_input(value: f64) -> Result<f64, AssignError> {
    if !value.is_finite() || value < 0.0 || value > 100.0 {
        return Err(AssignError::InvalidRatio { value });
    }
    if value > 1.0 {
        Ok(value / 100.0)
    } else {
        Ok(value)
    }
}

/// Write-time validation for a constraint. Clearing the criterion type
/// also clears the numeric fields so stale bounds cannot linger on an
/// inert category label.
pub fn normalize_for_write(def: &mut ConstraintDef) -> Result<(), AssignError> {
    if def.criterion_type.is_none() {
        def.min_ratio = None;
        def.min_students = None;
        def.max_students = None;
        return Ok(());
    }

    if let Some(ratio) = def.min_ratio {
        def.min_ratio = Some(ratio_from_input(ratio)?);
    }
    if let Some(min) = def.min_students {
        if min < 0 {
            return Err(AssignError::NegativeBound {
                field: "min_students",
                value: min,
            });
        }
    }
    if let Some(max) = def.max_students {
        if max < 0 {
            return Err(AssignError::NegativeBound {
                field: "max_students",
                value: max,
            });
        }
    }
    Ok(())
}

/// Normalize a questionnaire answer into [0, 1]: booleans map to
/// {0, 1}, scale answers divide by the question's max scale.
pub fn normalize_answer(raw: RawAnswer, max_scale: i32) -> f64 {
    match raw {
        RawAnswer::Bool(true) => 1.0,
        RawAnswer::Bool(false) => 0.0,
        RawAnswer::Scale(value) => {
            if max_scale <= 0 {
                if value > 0 {
                    1.0
                } else {
                    0.0
                }
            } else {
                (value as f64 / max_scale as f64).clamp(0.0, 1.0)
            }
        }
    }
}
