//! Launch command construction for JVM game servers

use crate::traits::LaunchBuilder;
use shared::ServerConfig;

/// G1 tuning flags appended after any user supplied runtime flags
pub const JVM_TUNING_FLAGS: &[&str] = &[
    "-XX:+UseG1GC",
    "-XX:+ParallelRefProcEnabled",
    "-XX:MaxGCPauseMillis=200",
    "-XX:+UnlockExperimentalVMOptions",
    "-XX:+DisableExplicitGC",
    "-XX:+AlwaysPreTouch",
    "-XX:G1NewSizePercent=30",
    "-XX:G1MaxNewSizePercent=40",
    "-XX:G1HeapRegionSize=8M",
    "-XX:G1ReservePercent=20",
    "-XX:G1HeapWastePercent=5",
    "-XX:G1MixedGCCountTarget=4",
    "-XX:InitiatingHeapOccupancyPercent=15",
    "-XX:G1MixedGCLiveThresholdPercent=90",
    "-XX:G1RSetUpdatingPauseTimePercent=5",
    "-XX:SurvivorRatio=32",
    "-XX:+PerfDisableSharedMem",
    "-XX:MaxTenuringThreshold=1",
];

/// Launches servers as `java <heap> <extra> <tuning> -jar <jar> nogui`
#[derive(Debug, Clone)]
pub struct JavaLauncher {
    java_path: String,
}

impl JavaLauncher {
    pub fn new(java_path: impl Into<String>) -> Self {
        Self { java_path: java_path.into() }
    }
}

impl Default for JavaLauncher {
    fn default() -> Self {
        Self::new("java")
    }
}

impl LaunchBuilder for JavaLauncher {
    fn program(&self) -> String {
        self.java_path.clone()
    }

    fn args(&self, config: &ServerConfig) -> Vec<String> {
        let mut args = vec![
            format!("-Xms{}", config.min_memory),
            format!("-Xmx{}", config.max_memory),
        ];
        args.extend(config.extra_args.iter().cloned());
        args.extend(JVM_TUNING_FLAGS.iter().map(|flag| flag.to_string()));
        args.extend(["-jar".to_string(), config.jar_file.clone(), "nogui".to_string()]);
        args
    }
}
