use {serde_json::json, tracing::debug};

use tether_protocol::methods as m;

use crate::{error::Error, params::Params};

use super::{MethodRegistry, unexpected_params};

pub(super) fn register(reg: &mut MethodRegistry) {
    // deviceInfo: ask the privileged helper, fall back to what we know locally
    reg.register(
        m::DEVICE_INFO,
        Box::new(|ctx| {
            Box::pin(async move {
                match ctx.state.helper.device_info().await {
                    Ok(info) => Ok(info),
                    Err(e) => {
                        debug!(error = %e, "helper unavailable, reporting local identity");
                        let identity = ctx.state.services.device.identity().await;
                        Ok(json!({
                            "serverUrl": identity.server_url,
                            "clientId": identity.client_id,
                            "errMsg": e.to_string(),
                        }))
                    },
                }
            })
        }),
    );

    // screenWithXml: latest frame plus UI hierarchy, each empty when its
    // capability isn't ready
    reg.register(
        m::SCREEN_WITH_XML,
        Box::new(|ctx| {
            Box::pin(async move {
                let readiness = ctx.state.readiness.snapshot();
                let device = &ctx.state.services.device;

                let (img_data, img_len) = if readiness.recording_ready {
                    let jpeg = device
                        .latest_screen_jpeg()
                        .await
                        .map_err(Error::HandlerFailure)?;
                    let len = jpeg.len();
                    (format!("data:image/jpeg;base64,{jpeg}"), len)
                } else {
                    (String::new(), 0)
                };
                let xml = if readiness.input_ready {
                    device
                        .window_hierarchy_xml()
                        .await
                        .map_err(Error::HandlerFailure)?
                } else {
                    String::new()
                };

                Ok(json!({
                    "xml": xml,
                    "imgData": img_data,
                    "imgLen": img_len,
                }))
            })
        }),
    );

    // getInstalledApps: ["all"] includes system packages
    reg.register(
        m::GET_INSTALLED_APPS,
        Box::new(|ctx| {
            Box::pin(async move {
                let Params::AppScope { all } = ctx.params else {
                    return Err(unexpected_params(&ctx.method, &ctx.params));
                };
                let apps = ctx
                    .state
                    .services
                    .device
                    .installed_apps(all)
                    .await
                    .map_err(Error::HandlerFailure)?;
                Ok(json!({ "apps": apps }))
            })
        }),
    );
}
