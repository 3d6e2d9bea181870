fn main() {
    #[cfg(feature = "cuda")]
    cuda_builder::CudaBuilder::new("../kernel_tools")
        .copy_to("../resources/kernel_tools.ptx")
        .build()
        .unwrap();
}
