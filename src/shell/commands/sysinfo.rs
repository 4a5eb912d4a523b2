use crate::shell::commands::{ExecutionContext, Outcome};
use rand::Rng;

const LSCPU: &str = "Architecture:        x86_64
CPU op-mode(s):      32-bit, 64-bit
Byte Order:          Little Endian
CPU(s):              4
On-line CPU(s) list: 0-3
Thread(s) per core:  1
Core(s) per socket:  4
Socket(s):           1
NUMA node(s):        1
Vendor ID:           AuthenticAMD
CPU family:          16
Model:               5
Model name:          AMD Athlon(tm) II X4 645 Processor
Stepping:            3
CPU MHz:             3100.000
CPU max MHz:         3100.0000
CPU min MHz:         800.0000
BogoMIPS:            6200.00
Virtualization:      AMD-V
L1d cache:           64K
L1i cache:           64K
L2 cache:            512K
NUMA node0 CPU(s):   0-3
Flags:               fpu vme de pse tsc msr pae mce cx8 apic sep mtrr pge mca cmov pat pse36 clflush mmx fxsr sse sse2 ht syscall nx mmxext fxsr_opt pdpe1gb rdtscp lm 3dnowext 3dnow constant_tsc rep_good nopl nonstop_tsc cpuid extd_apicid amd_dcm aperfmperf pni monitor cx16 popcnt lahf_lm cmp_legacy svm extapic cr8_legacy abm sse4a misalignsse 3dnowprefetch osvw ibs skinit wdt nodeid_msr npt lbrv svm_lock nrip_save
";

/// Memory figures in KiB, as `free` prints them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStats {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub shared: u64,
    pub buff_cache: u64,
    pub available: u64,
    pub swap_total: u64,
    pub swap_used: u64,
}

impl MemoryStats {
    pub const TOTAL: u64 = 524_288;
    pub const SWAP_TOTAL: u64 = 131_072;

    /// Pick a consistent snapshot: `used + free + buff_cache == total` and
    /// `available <= total - used + shared`.
    pub fn sample<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let total = Self::TOTAL;
        let used = rng.gen_range(150_000..200_000);
        let shared = rng.gen_range(5_000..7_000);
        let buff_cache = rng.gen_range(100_000..130_000);
        let free = total - used - buff_cache;
        let available = (free + buff_cache / 3).min(total - used + shared);
        Self {
            total,
            used,
            free,
            shared,
            buff_cache,
            available,
            swap_total: Self::SWAP_TOTAL,
            swap_used: rng.gen_range(1_000..6_000),
        }
    }

    pub fn render(&self) -> String {
        let mut out = format!(
            "{:10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10}\n",
            "", "total", "used", "free", "shared", "buff/cache", "available"
        );
        out.push_str(&format!(
            "{:<10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10}\n",
            "Mem:", self.total, self.used, self.free, self.shared, self.buff_cache, self.available
        ));
        out.push_str(&format!(
            "{:<10} {:>10} {:>10} {:>10}\n",
            "Swap:",
            self.swap_total,
            self.swap_used,
            self.swap_total - self.swap_used
        ));
        out
    }
}

pub async fn lscpu(ctx: ExecutionContext<'_>) -> Outcome {
    Outcome::from_output(0, ctx.stdout.write_str(LSCPU).await)
}

pub async fn free(ctx: ExecutionContext<'_>) -> Outcome {
    let stats = MemoryStats::sample(&mut rand::thread_rng());
    Outcome::from_output(0, ctx.stdout.write_str(&stats.render()).await)
}

/// PCI access is always refused.
pub async fn lspci(ctx: ExecutionContext<'_>) -> Outcome {
    let written = ctx
        .stderr
        .write_line("lspci: Cannot open /sys/bus/pci/devices: Permission denied")
        .await;
    Outcome::after_write(1, written)
}
