// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Runtime support for dynamically allocated matrices.
//!
//! A tensor is a heap struct with column-major data, a shape array and the
//! cached element count. Every helper is keyed by its name, so instances
//! requested from many places collapse into one definition.

use std::sync::Arc;

use matisse_types::NumericClass;

use crate::ctype::{class_code, scalar_c_type, tensor_struct};
use crate::function_type::FunctionType;
use crate::instance::{FunctionInstance, InstanceKey};

fn helper_key(name: &str) -> InstanceKey {
    InstanceKey::new(name, FunctionType::new(Vec::new(), Vec::new()))
}

/// `typedef struct tensor_X { ... } tensor_X;`
pub fn struct_definition(class: NumericClass) -> Arc<FunctionInstance> {
    let name = tensor_struct(class);
    let code = format!(
        "typedef struct {name} {{\n   {elem}* data;\n   int* shape;\n   int ndims;\n   int length;\n}} {name};",
        name = name,
        elem = scalar_c_type(class),
    );
    let mut def = FunctionInstance::definition(name, code);
    if class.is_integer() {
        def = def.with_include("stdint.h");
    }
    if class == NumericClass::Logical {
        def = def.with_include("stdbool.h");
    }
    Arc::new(def)
}

pub fn new_tensor_name(class: NumericClass) -> String {
    format!("new_tensor_{}", class_code(class))
}

pub fn free_tensor_name(class: NumericClass) -> String {
    format!("free_tensor_{}", class_code(class))
}

pub fn resize_tensor_name(class: NumericClass) -> String {
    format!("resize_tensor_{}", class_code(class))
}

/// Allocates (or reuses) `*t` with the given shape, zero-filled when fresh.
pub fn new_tensor(class: NumericClass) -> Arc<FunctionInstance> {
    let name = new_tensor_name(class);
    let tensor = tensor_struct(class);
    let elem = scalar_c_type(class);
    Arc::new(
        FunctionInstance::standalone(helper_key(&name), name.clone())
            .raw_parameters(format!("int ndims, const int* shape, {}** t", tensor))
            .lines([
                "int length = 1;".to_string(),
                "for (int i = 0; i < ndims; ++i) {".to_string(),
                "length *= shape[i];".to_string(),
                "}".to_string(),
                "if (*t == NULL) {".to_string(),
                format!("*t = ({}*) calloc(1, sizeof({}));", tensor, tensor),
                "}".to_string(),
                "if ((*t)->data == NULL || (*t)->length != length) {".to_string(),
                "free((*t)->data);".to_string(),
                format!(
                    "(*t)->data = ({}*) calloc(length > 0 ? length : 1, sizeof({}));",
                    elem, elem
                ),
                "}".to_string(),
                "free((*t)->shape);".to_string(),
                "(*t)->shape = (int*) malloc(sizeof(int) * (ndims > 0 ? ndims : 1));".to_string(),
                "for (int i = 0; i < ndims; ++i) {".to_string(),
                "(*t)->shape[i] = shape[i];".to_string(),
                "}".to_string(),
                "(*t)->ndims = ndims;".to_string(),
                "(*t)->length = length;".to_string(),
            ])
            .include("stdlib.h")
            .depends_on(struct_definition(class))
            .build(),
    )
}

pub fn free_tensor(class: NumericClass) -> Arc<FunctionInstance> {
    let name = free_tensor_name(class);
    Arc::new(
        FunctionInstance::standalone(helper_key(&name), name.clone())
            .raw_parameters(format!("{}** t", tensor_struct(class)))
            .lines([
                "if (*t == NULL) {",
                "return;",
                "}",
                "free((*t)->data);",
                "free((*t)->shape);",
                "free(*t);",
                "*t = NULL;",
            ])
            .include("stdlib.h")
            .depends_on(struct_definition(class))
            .build(),
    )
}

/// Resizes a 2-D tensor to `rows x cols`, keeping overlapping elements.
pub fn resize_tensor(class: NumericClass) -> Arc<FunctionInstance> {
    let name = resize_tensor_name(class);
    let tensor = tensor_struct(class);
    Arc::new(
        FunctionInstance::standalone(helper_key(&name), name.clone())
            .raw_parameters(format!("{}** t, int rows, int cols", tensor))
            .lines([
                format!("{}* old = *t;", tensor),
                "int old_rows = (old != NULL && old->ndims > 0) ? old->shape[0] : 0;".to_string(),
                "int old_cols = (old != NULL && old_rows > 0) ? old->length / old_rows : 0;".to_string(),
                "if (old != NULL && old_rows == rows && old_cols == cols) {".to_string(),
                "return;".to_string(),
                "}".to_string(),
                format!("{}* fresh = NULL;", tensor),
                "int shape[2] = {rows, cols};".to_string(),
                format!("{}(2, shape, &fresh);", new_tensor_name(class)),
                "for (int j = 0; j < old_cols && j < cols; ++j) {".to_string(),
                "for (int i = 0; i < old_rows && i < rows; ++i) {".to_string(),
                "fresh->data[i + j * rows] = old->data[i + j * old_rows];".to_string(),
                "}".to_string(),
                "}".to_string(),
                format!("{}(&old);", free_tensor_name(class)),
                "*t = fresh;".to_string(),
            ])
            .depends_on(new_tensor(class))
            .depends_on(free_tensor(class))
            .build(),
    )
}

pub const INDEX_ERROR: &str = "matisse_index_error";

/// Reports an out-of-range index and aborts.
pub fn index_error() -> Arc<FunctionInstance> {
    Arc::new(
        FunctionInstance::standalone(helper_key(INDEX_ERROR), INDEX_ERROR)
            .raw_parameters("long long index, long long extent")
            .lines([
                "fprintf(stderr, \"index %lld out of bounds (extent %lld)\\n\", index, extent);",
                "abort();",
            ])
            .include("stdio.h")
            .include("stdlib.h")
            .build(),
    )
}

pub const SHAPE_ERROR: &str = "matisse_shape_error";

/// Reports operands with differing element counts and aborts.
pub fn shape_error() -> Arc<FunctionInstance> {
    Arc::new(
        FunctionInstance::standalone(helper_key(SHAPE_ERROR), SHAPE_ERROR)
            .raw_parameters("long long left, long long right")
            .lines([
                "fprintf(stderr, \"nonconformant operands (%lld vs %lld elements)\\n\", left, right);",
                "abort();",
            ])
            .include("stdio.h")
            .include("stdlib.h")
            .build(),
    )
}

/// Range check of a 1-based index against an extent.
pub(crate) fn check(index: &str, extent: &str) -> String {
    format!(
        "if ({i} < 1 || {i} > {e}) {{ {f}({i}, {e}); }}",
        i = index,
        e = extent,
        f = INDEX_ERROR
    )
}
