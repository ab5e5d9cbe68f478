//! `HELLO.WORLD [name]`

use crate::commands::{Command, Extension, RegistryError};

pub fn register(ext: &Extension) -> Result<(), RegistryError> {
    ext.register(
        Command::new("HELLO.WORLD")
            .description("Returns a greeting message")
            .arity(1, 2)
            .handler(|ctx| {
                let greeting = format!("Hello, {}!", ctx.arg(1).unwrap_or("World"));
                Ok(ctx.reply(&greeting)?)
            }),
    )
}
