use poolbench::ComputationRegistry;

fn main() -> anyhow::Result<()> {
    poolbench::run(ComputationRegistry::builtin())
}
