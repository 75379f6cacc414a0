use crate::cmd::{Context, TypesArgs};
use crate::exit::{CliResult, SUCCESS};
use crate::output::print_types;

pub fn run(_args: TypesArgs, ctx: &Context) -> CliResult<i32> {
    print_types(&ctx.types, ctx.format);
    Ok(SUCCESS)
}
