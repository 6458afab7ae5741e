use pmulink_channel::Request;

use crate::cmd::SendArgs;
use crate::exit::{channel_error, CliResult, SUCCESS};
use crate::output::{parse_hex, print_record, FrameOutput, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let payload = parse_hex(&args.hex)?;
    let link = args.link.open()?;

    let out = if args.wait {
        let mut request = Request::new(args.command).with_payload(payload);
        if let Some(expect) = args.expect {
            request = request.expect_reply(expect);
        }
        let reply = link
            .execute(request)
            .map_err(|err| channel_error("send failed", err))?;
        FrameOutput::new(reply.frame_id(), reply.command(), reply.payload())
    } else {
        let frame_id = link
            .send(args.command, payload.clone())
            .map_err(|err| channel_error("send failed", err))?;
        FrameOutput::new(frame_id, args.command, &payload)
    };
    print_record(&out, format);

    let _ = link.close();
    Ok(SUCCESS)
}
