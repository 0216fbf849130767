//! Typed constant editors.
//!
//! A [`ConstantEditor`] interprets the raw byte run of one constant (or one
//! overlay sub-range of it) and converts between stored bytes and displayed
//! values. Every variant exposes the same contract:
//!
//! - [`ConstantEditor::read`]: bytes → displayed values
//! - [`ConstantEditor::write`]: displayed values → bytes (clamped)
//!
//! Byte runs are little-endian; typed access goes through `zerocopy`'s
//! unaligned byte-order wrappers so any sub-slice of the buffer can be used.

use serde::Deserialize;
use thiserror::Error;
use zerocopy::byteorder::little_endian::{F32, I16, I32, U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::overlay::OverlayFields;

/// Errors raised when a byte run does not fit an editor.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EditorError {
    #[error("byte run of {len} bytes is not a whole number of {width}-byte elements")]
    Length { len: usize, width: usize },
    #[error("expected {expected} values, got {actual}")]
    ValueCount { expected: usize, actual: usize },
    #[error("hidden constants cannot be written")]
    ReadOnly,
    #[error("lanes {start}..{end} lie outside a buffer of {lanes} lanes")]
    OutOfBuffer { start: u32, end: u32, lanes: u32 },
}

/// Editor kind named by overlay data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
pub enum EditorType {
    Hidden,
    #[default]
    Float,
    Integer,
    Color,
    Enum,
}

/// Storage width of an integer editor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
pub enum IntWidth {
    I8,
    U8,
    I16,
    U16,
    #[default]
    I32,
    U32,
}

impl IntWidth {
    pub const fn byte_size(self) -> usize {
        match self {
            IntWidth::I8 | IntWidth::U8 => 1,
            IntWidth::I16 | IntWidth::U16 => 2,
            IntWidth::I32 | IntWidth::U32 => 4,
        }
    }

    /// Representable range.
    pub const fn bounds(self) -> (f64, f64) {
        match self {
            IntWidth::I8 => (i8::MIN as f64, i8::MAX as f64),
            IntWidth::U8 => (0.0, u8::MAX as f64),
            IntWidth::I16 => (i16::MIN as f64, i16::MAX as f64),
            IntWidth::U16 => (0.0, u16::MAX as f64),
            IntWidth::I32 => (i32::MIN as f64, i32::MAX as f64),
            IntWidth::U32 => (0.0, u32::MAX as f64),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FloatEditor {
    pub min: f32,
    pub max: f32,
    pub step: f32,
    pub factor: f32,
    pub bias: f32,
    pub exponent: f32,
}

impl Default for FloatEditor {
    fn default() -> Self {
        Self {
            min: f32::NEG_INFINITY,
            max: f32::INFINITY,
            step: 0.0,
            factor: 1.0,
            bias: 0.0,
            exponent: 1.0,
        }
    }
}

impl FloatEditor {
    fn display(&self, raw: f32) -> f64 {
        let shaped = signed_pow(raw as f64, self.exponent as f64);
        shaped * self.factor as f64 + self.bias as f64
    }

    fn raw(&self, display: f64) -> f32 {
        let display = display.max(self.min as f64).min(self.max as f64);
        let unbiased = (display - self.bias as f64) / self.factor as f64;
        signed_pow(unbiased, 1.0 / self.exponent as f64) as f32
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct IntegerEditor {
    pub width: IntWidth,
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl IntegerEditor {
    pub fn new(width: IntWidth) -> Self {
        let (min, max) = width.bounds();
        Self {
            width,
            min,
            max,
            step: 1.0,
        }
    }

    fn clamp(&self, value: f64) -> f64 {
        let (lo, hi) = self.width.bounds();
        value.round().max(self.min.max(lo)).min(self.max.min(hi))
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ColorEditor {
    /// Allow components above 1.
    pub hdr: bool,
    /// RGB is stored squared (alpha never is).
    pub squared_rgb: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnumValue {
    pub label: String,
    pub value: f32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EnumEditor {
    pub values: Vec<EnumValue>,
}

impl EnumEditor {
    pub fn label_of(&self, value: f32) -> Option<&str> {
        self.values
            .iter()
            .find(|v| v.value == value)
            .map(|v| v.label.as_str())
    }
}

/// Closed set of editor behaviours for a constant.
#[derive(Clone, Debug, PartialEq)]
pub enum ConstantEditor {
    Hidden,
    Float(FloatEditor),
    Integer(IntegerEditor),
    Color(ColorEditor),
    Enum(EnumEditor),
}

impl Default for ConstantEditor {
    fn default() -> Self {
        ConstantEditor::Float(FloatEditor::default())
    }
}

impl ConstantEditor {
    /// Build the editor described by overlay fields.
    ///
    /// Zero factors and exponents are treated as neutral.
    pub fn from_fields(fields: &OverlayFields) -> Self {
        match fields.editor_type.unwrap_or_default() {
            EditorType::Hidden => ConstantEditor::Hidden,
            EditorType::Float => {
                let neutral = |v: Option<f32>| v.filter(|&v| v != 0.0).unwrap_or(1.0);
                ConstantEditor::Float(FloatEditor {
                    min: fields.min.unwrap_or(f32::NEG_INFINITY),
                    max: fields.max.unwrap_or(f32::INFINITY),
                    step: fields.step.unwrap_or(0.0),
                    factor: neutral(fields.factor),
                    bias: fields.bias.unwrap_or(0.0),
                    exponent: neutral(fields.exponent),
                })
            }
            EditorType::Integer => {
                let mut editor = IntegerEditor::new(fields.width.unwrap_or_default());
                if let Some(min) = fields.min {
                    editor.min = min as f64;
                }
                if let Some(max) = fields.max {
                    editor.max = max as f64;
                }
                if let Some(step) = fields.step {
                    editor.step = step as f64;
                }
                ConstantEditor::Integer(editor)
            }
            EditorType::Color => ConstantEditor::Color(ColorEditor {
                hdr: fields.hdr,
                squared_rgb: fields.squared_rgb,
            }),
            EditorType::Enum => ConstantEditor::Enum(EnumEditor {
                values: fields
                    .values
                    .iter()
                    .map(|v| EnumValue {
                        label: v.label.clone(),
                        value: v.value as f32,
                    })
                    .collect(),
            }),
        }
    }

    /// Size in bytes of one displayed element.
    pub const fn element_size(&self) -> usize {
        match self {
            ConstantEditor::Integer(editor) => editor.width.byte_size(),
            _ => 4,
        }
    }

    /// Number of displayed elements in a byte run of `len` bytes.
    pub const fn element_count(&self, len: usize) -> usize {
        len / self.element_size()
    }

    /// Decode a byte run into displayed values.
    pub fn read(&self, bytes: &[u8]) -> Result<Vec<f64>, EditorError> {
        match self {
            ConstantEditor::Hidden => Ok(Vec::new()),
            ConstantEditor::Float(editor) => Ok(floats(bytes)?
                .iter()
                .map(|f| editor.display(f.get()))
                .collect()),
            ConstantEditor::Integer(editor) => read_ints(editor.width, bytes),
            ConstantEditor::Color(editor) => Ok(floats(bytes)?
                .iter()
                .enumerate()
                .map(|(i, f)| {
                    let raw = f.get() as f64;
                    if editor.squared_rgb && i % 4 < 3 {
                        raw.max(0.0).sqrt()
                    } else {
                        raw
                    }
                })
                .collect()),
            ConstantEditor::Enum(_) => Ok(floats(bytes)?.iter().map(|f| f.get() as f64).collect()),
        }
    }

    /// Encode displayed values into a byte run of matching length.
    pub fn write(&self, values: &[f64], bytes: &mut [u8]) -> Result<(), EditorError> {
        match self {
            ConstantEditor::Hidden => Err(EditorError::ReadOnly),
            ConstantEditor::Float(editor) => {
                self.check_shape(values, bytes)?;
                for (slot, &value) in floats_mut(bytes)?.iter_mut().zip(values) {
                    slot.set(editor.raw(value));
                }
                Ok(())
            }
            ConstantEditor::Integer(editor) => {
                self.check_shape(values, bytes)?;
                write_ints(editor, values, bytes)
            }
            ConstantEditor::Color(editor) => {
                self.check_shape(values, bytes)?;
                for (i, (slot, &value)) in floats_mut(bytes)?.iter_mut().zip(values).enumerate() {
                    let value = if editor.hdr { value.max(0.0) } else { value.clamp(0.0, 1.0) };
                    let stored = if editor.squared_rgb && i % 4 < 3 { value * value } else { value };
                    slot.set(stored as f32);
                }
                Ok(())
            }
            ConstantEditor::Enum(_) => {
                self.check_shape(values, bytes)?;
                for (slot, &value) in floats_mut(bytes)?.iter_mut().zip(values) {
                    slot.set(value as f32);
                }
                Ok(())
            }
        }
    }

    /// One value per whole element of `bytes`.
    fn check_shape(&self, values: &[f64], bytes: &[u8]) -> Result<(), EditorError> {
        let width = self.element_size();
        if bytes.len() % width != 0 {
            return Err(EditorError::Length {
                len: bytes.len(),
                width,
            });
        }
        let expected = self.element_count(bytes.len());
        if values.len() != expected {
            return Err(EditorError::ValueCount {
                expected,
                actual: values.len(),
            });
        }
        Ok(())
    }
}

fn signed_pow(value: f64, exponent: f64) -> f64 {
    if exponent == 1.0 {
        return value;
    }
    value.signum() * value.abs().powf(exponent)
}

fn cast<T: FromBytes + KnownLayout + Immutable + Unaligned>(bytes: &[u8]) -> Result<&[T], EditorError> {
    <[T]>::ref_from_bytes(bytes).map_err(|_| EditorError::Length {
        len: bytes.len(),
        width: size_of::<T>(),
    })
}

fn cast_mut<T: FromBytes + IntoBytes + KnownLayout + Unaligned>(
    bytes: &mut [u8],
) -> Result<&mut [T], EditorError> {
    let len = bytes.len();
    <[T]>::mut_from_bytes(bytes).map_err(|_| EditorError::Length {
        len,
        width: size_of::<T>(),
    })
}

fn floats(bytes: &[u8]) -> Result<&[F32], EditorError> {
    cast::<F32>(bytes)
}

fn floats_mut(bytes: &mut [u8]) -> Result<&mut [F32], EditorError> {
    cast_mut::<F32>(bytes)
}

fn read_ints(width: IntWidth, bytes: &[u8]) -> Result<Vec<f64>, EditorError> {
    Ok(match width {
        IntWidth::I8 => cast::<i8>(bytes)?.iter().map(|&v| v as f64).collect(),
        IntWidth::U8 => cast::<u8>(bytes)?.iter().map(|&v| v as f64).collect(),
        IntWidth::I16 => cast::<I16>(bytes)?.iter().map(|v| v.get() as f64).collect(),
        IntWidth::U16 => cast::<U16>(bytes)?.iter().map(|v| v.get() as f64).collect(),
        IntWidth::I32 => cast::<I32>(bytes)?.iter().map(|v| v.get() as f64).collect(),
        IntWidth::U32 => cast::<U32>(bytes)?.iter().map(|v| v.get() as f64).collect(),
    })
}

fn write_ints(editor: &IntegerEditor, values: &[f64], bytes: &mut [u8]) -> Result<(), EditorError> {
    let clamped = values.iter().map(|&v| editor.clamp(v));
    match editor.width {
        IntWidth::I8 => cast_mut::<i8>(bytes)?
            .iter_mut()
            .zip(clamped)
            .for_each(|(slot, v)| *slot = v as i8),
        IntWidth::U8 => cast_mut::<u8>(bytes)?
            .iter_mut()
            .zip(clamped)
            .for_each(|(slot, v)| *slot = v as u8),
        IntWidth::I16 => cast_mut::<I16>(bytes)?
            .iter_mut()
            .zip(clamped)
            .for_each(|(slot, v)| slot.set(v as i16)),
        IntWidth::U16 => cast_mut::<U16>(bytes)?
            .iter_mut()
            .zip(clamped)
            .for_each(|(slot, v)| slot.set(v as u16)),
        IntWidth::I32 => cast_mut::<I32>(bytes)?
            .iter_mut()
            .zip(clamped)
            .for_each(|(slot, v)| slot.set(v as i32)),
        IntWidth::U32 => cast_mut::<U32>(bytes)?
            .iter_mut()
            .zip(clamped)
            .for_each(|(slot, v)| slot.set(v as u32)),
    }
    Ok(())
}
