//! Float helpers for operations Cranelift has no instruction for

/// Lua float modulo: `fmod` adjusted so the result takes the divisor's sign
#[no_mangle]
pub extern "C" fn lowlua_float_mod(a: f64, b: f64) -> f64 {
    let m = a % b;
    if m * b < 0.0 {
        m + b
    } else {
        m
    }
}

/// Lua `^`, always a float
#[no_mangle]
pub extern "C" fn lowlua_float_pow(a: f64, b: f64) -> f64 {
    a.powf(b)
}
