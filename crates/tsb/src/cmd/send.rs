use std::fs;
use std::io::ErrorKind;

use tsb_frame::{
    ChannelPath, Frame, FrameConfig, FrameError, FrameReader, FrameWriter, TypePath, TypeRegistry,
};
use tsb_transport::TcpTransport;

use crate::cmd::{parse_duration, Context, SendArgs};
use crate::exit::{
    frame_error, io_error, transport_error, CliError, CliResult, SUCCESS, TIMEOUT, USAGE,
};
use crate::output::print_frame;

pub fn run(args: SendArgs, ctx: &Context) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let channel: ChannelPath = args
        .channel
        .parse()
        .map_err(|err| frame_error("invalid --channel", err))?;
    let frame_type = resolve_type(&args.frame_type, &ctx.types)?;
    let payload = resolve_payload(&args)?;
    let frame = Frame::new(channel, frame_type, payload);

    let stream = TcpTransport::connect_with_timeout(&args.addr, Some(timeout))
        .map_err(|err| transport_error("connect failed", err))?;
    let reader_stream = stream
        .try_clone()
        .map_err(|err| io_error("connect failed", err))?;

    let mut writer = FrameWriter::with_config_tcp(stream, ctx.frame.clone())
        .map_err(|err| frame_error("connect failed", err))?;
    writer
        .write_frame(&frame)
        .map_err(|err| frame_error("send failed", err))?;
    tracing::info!(
        addr = %args.addr,
        channel = %frame.channel,
        frame_type = %frame.frame_type,
        "frame sent"
    );

    if args.wait {
        let config = FrameConfig {
            read_timeout: Some(timeout),
            ..ctx.frame.clone()
        };
        let mut reader = FrameReader::with_config_tcp(reader_stream, config)
            .map_err(|err| frame_error("receive failed", err))?;
        let reply = reader.read_frame().map_err(|err| match err {
            FrameError::Io(e)
                if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                CliError::new(TIMEOUT, format!("no frame within {timeout:?}"))
            }
            other => frame_error("receive failed", other),
        })?;
        print_frame(&reply, &args.addr, &ctx.types, ctx.format);
    }

    Ok(SUCCESS)
}

/// Accepts a registry label (`hci`), hex (`0x15`), decimal (`21`), or a
/// dotted path of codes (`0x15.3`).
pub(crate) fn resolve_type(input: &str, types: &TypeRegistry) -> CliResult<TypePath> {
    if let Some(code) = types.lookup_name(input) {
        return TypePath::code(code).map_err(|err| frame_error("invalid --type", err));
    }

    let codes = input
        .split('.')
        .map(parse_code)
        .collect::<Option<Vec<u8>>>()
        .ok_or_else(|| CliError::new(USAGE, format!("unknown frame type: {input}")))?;
    TypePath::new(&codes).map_err(|err| frame_error("invalid --type", err))
}

fn parse_code(part: &str) -> Option<u8> {
    let part = part.trim();
    match part.strip_prefix("0x").or_else(|| part.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16).ok(),
        None => part.parse().ok(),
    }
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(hex) = &args.hex {
        return parse_hex(hex);
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Vec::new())
}

fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    tsb_frame::hex::decode(input)
        .map_err(|err| CliError::new(USAGE, format!("invalid --hex: {err}")))
}
