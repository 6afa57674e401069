// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! Array type held by variants, with optional multi-dimensional shape.

use thiserror::Error;

use crate::variant::{Variant, VariantScalarTypeId};

/// Error constructing an array.
#[derive(Debug, Error)]
pub enum ArrayError {
    /// An element's type does not match the array's element type.
    #[error("Array of {0:?} contains an element of another type")]
    ElementTypeMismatch(VariantScalarTypeId),
    /// The dimension product does not match the number of values.
    #[error("Array dimension product {product} does not match value count {len}")]
    DimensionMismatch {
        /// Product of the declared dimensions.
        product: usize,
        /// Actual number of values.
        len: usize,
    },
}

/// An array of variant values, all of the same scalar type, with an
/// optional set of dimensions describing a multi-dimensional layout.
///
/// Invariant: when `dimensions` is present, the product of the dimensions
/// equals the number of values. Construction enforces this, decode
/// re-validates it.
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    /// The scalar type of every element.
    pub value_type: VariantScalarTypeId,
    /// The elements, flattened in row-major order.
    pub values: Vec<Variant>,
    /// Dimensions of a multi-dimensional array, `None` for one dimension.
    pub dimensions: Option<Vec<u32>>,
}

impl Array {
    /// Create a single dimension array.
    pub fn new(
        value_type: VariantScalarTypeId,
        values: impl Into<Vec<Variant>>,
    ) -> Result<Array, ArrayError> {
        let values = values.into();
        validate_elements(value_type, &values)?;
        Ok(Array {
            value_type,
            values,
            dimensions: None,
        })
    }

    /// Create a multi-dimension array. The product of the dimensions must
    /// equal the number of values.
    pub fn new_multi(
        value_type: VariantScalarTypeId,
        values: impl Into<Vec<Variant>>,
        dimensions: impl Into<Vec<u32>>,
    ) -> Result<Array, ArrayError> {
        let values = values.into();
        let dimensions = dimensions.into();
        validate_elements(value_type, &values)?;
        let product: usize = dimensions.iter().map(|d| *d as usize).product();
        if product != values.len() {
            return Err(ArrayError::DimensionMismatch {
                product,
                len: values.len(),
            });
        }
        Ok(Array {
            value_type,
            values,
            dimensions: Some(dimensions),
        })
    }

    /// True when the array has no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of values in the array.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if the dimensions, when present, multiply out to the number
    /// of values.
    pub fn is_valid(&self) -> bool {
        self.dimensions.as_ref().map_or(true, |dims| {
            dims.iter().map(|d| *d as usize).product::<usize>() == self.values.len()
        })
    }
}

fn validate_elements(
    value_type: VariantScalarTypeId,
    values: &[Variant],
) -> Result<(), ArrayError> {
    if values
        .iter()
        .any(|v| v.scalar_type_id() != Some(value_type))
    {
        Err(ArrayError::ElementTypeMismatch(value_type))
    } else {
        Ok(())
    }
}
