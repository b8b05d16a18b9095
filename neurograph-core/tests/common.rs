use neurograph_core::{feed_buffer, Flags, Model, NeuroGraphError};

// Added allow(dead_code) because usage across different test crates isn't detected easily.
#[allow(dead_code)]
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Binds one freshly allocated buffer to the unique feed matching `flag` and label 0.
#[allow(dead_code)]
pub fn bind_one(model: &mut dyn Model, flag: Flags, data: Vec<f32>) -> Result<(), NeuroGraphError> {
    model.feed_bind(flag, 0, vec![feed_buffer(data)])?;
    Ok(())
}
