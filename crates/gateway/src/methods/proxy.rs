use {
    serde_json::json,
    tracing::{info, warn},
};

use tether_protocol::methods as m;

use crate::params::Params;

use super::{MethodRegistry, unexpected_params};

const SAVE_OK: &str = "Save successful";
const SAVE_FAILED: &str = "Save failed";

pub(super) fn register(reg: &mut MethodRegistry) {
    // isClashRunning
    reg.register(
        m::IS_CLASH_RUNNING,
        Box::new(|ctx| {
            Box::pin(async move {
                Ok(json!({ "isClashRunning": ctx.state.lifecycle.is_running() }))
            })
        }),
    );

    // editClashProxyConfig: persist the pool settings, then rebuild the
    // profile in the background
    reg.register(
        m::EDIT_CLASH_PROXY_CONFIG,
        Box::new(|ctx| {
            Box::pin(async move {
                let Params::ProxyPool(settings) = ctx.params else {
                    return Err(unexpected_params(&ctx.method, &ctx.params));
                };
                let res = match ctx.state.store.save_settings(settings) {
                    Ok(()) => {
                        info!("proxy pool settings saved");
                        SAVE_OK
                    },
                    Err(e) => {
                        warn!(error = %e, "failed to save proxy pool settings");
                        SAVE_FAILED
                    },
                };
                ctx.state.lifecycle.spawn_update();
                Ok(json!({ "res": res }))
            })
        }),
    );

    // setClashAutoRestart
    reg.register(
        m::SET_CLASH_AUTO_RESTART,
        Box::new(|ctx| {
            Box::pin(async move {
                let Params::AutoRestart(enabled) = ctx.params else {
                    return Err(unexpected_params(&ctx.method, &ctx.params));
                };
                let prefs = ctx
                    .state
                    .store
                    .update_preferences(|p| p.auto_restart = enabled)?;
                Ok(json!({ "autoRestart": prefs.auto_restart }))
            })
        }),
    );

    // setAccessControlPackages
    reg.register(
        m::SET_ACCESS_CONTROL_PACKAGES,
        Box::new(|ctx| {
            Box::pin(async move {
                let Params::Packages(packages) = ctx.params else {
                    return Err(unexpected_params(&ctx.method, &ctx.params));
                };
                let prefs = ctx
                    .state
                    .store
                    .update_preferences(|p| p.access_control_packages = packages)?;
                Ok(json!({ "accessControlPackages": prefs.access_control_packages }))
            })
        }),
    );

    // setAccessControlMode
    reg.register(
        m::SET_ACCESS_CONTROL_MODE,
        Box::new(|ctx| {
            Box::pin(async move {
                let Params::Mode(mode) = ctx.params else {
                    return Err(unexpected_params(&ctx.method, &ctx.params));
                };
                let prefs = ctx
                    .state
                    .store
                    .update_preferences(|p| p.access_control_mode = mode)?;
                Ok(json!({ "accessControlMode": prefs.access_control_mode }))
            })
        }),
    );

    // startClash: false when already running or the user must consent first
    reg.register(
        m::START_CLASH,
        Box::new(|ctx| {
            Box::pin(async move {
                let started = ctx.state.lifecycle.start().await?;
                Ok(json!({ "res": started }))
            })
        }),
    );

    // stopClash
    reg.register(
        m::STOP_CLASH,
        Box::new(|ctx| {
            Box::pin(async move {
                ctx.state.lifecycle.stop().await?;
                Ok(json!({ "ok": true }))
            })
        }),
    );

    // getClashConfig: everything the settings panel shows
    reg.register(
        m::GET_CLASH_CONFIG,
        Box::new(|ctx| {
            Box::pin(async move {
                let state = &ctx.state;
                let settings = state.store.settings();
                let prefs = state.store.preferences();
                let config_yaml = state.synthesizer.synthesize(&settings)?;
                Ok(json!({
                    "accessControlMode": prefs.access_control_mode,
                    "accessControlPackages": prefs.access_control_packages,
                    "autoRestart": prefs.auto_restart,
                    "proxyPoolHost": settings.proxy_pool_host,
                    "proxyPoolPort": settings.proxy_pool_port,
                    "username": settings.username,
                    "password": settings.password,
                    "configYaml": config_yaml,
                    "state": state.lifecycle.state(),
                }))
            })
        }),
    );

    // updateClash: regenerate and restart in the background
    reg.register(
        m::UPDATE_CLASH,
        Box::new(|ctx| {
            Box::pin(async move {
                ctx.state.lifecycle.spawn_update();
                Ok(json!({ "ok": true }))
            })
        }),
    );
}
